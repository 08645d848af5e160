//! Common test infrastructure
//!
//! Provides a seeded scratch warehouse for the end-to-end tests. Tests
//! import from this module only, not from internal submodules.

mod fixtures;

pub use fixtures::{SeededJob, TestWarehouse, RESOURCE_ID};
