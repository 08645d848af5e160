//! Warehouse Accounting Library
//!
//! Reads HPC job-accounting records from the data warehouse, correlates
//! each job against the performance-archive indexes, and writes back a
//! per-job processing status. Exposed as a library for the worker binaries
//! and for the integration tests.

pub mod accounting;
pub mod config;
pub mod errors;
pub mod sqlite_persistence;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use accounting::{
    ArchiveCache, FilterOptions, Job, JobSelector, ProcessStatus, ShardSpec, StatusWriter,
    PROCESS_VERSION,
};
pub use errors::ProcessingError;
pub use warehouse::{open_warehouse, WarehouseSettings};
