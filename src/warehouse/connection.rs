//! Connection acquisition for the accounting warehouse.
//!
//! Components receive a [`WarehouseSettings`] and call [`open_connection`];
//! nothing else in the crate touches paths or pragmas. Every connection gets
//! the `crc32` scalar registered so the sharding filter can be evaluated
//! warehouse-side.

use anyhow::{Context, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub db_path: PathBuf,
}

impl WarehouseSettings {
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

/// Open a ready-to-use warehouse connection.
///
/// WAL mode is required: the status writer commits while the job cursor is
/// still open on another connection, and the registrar runs concurrently
/// with any number of selecting workers.
pub fn open_connection(settings: &WarehouseSettings) -> Result<Connection> {
    let conn = Connection::open(&settings.db_path)
        .with_context(|| format!("Failed to open warehouse database {:?}", settings.db_path))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    register_crc32(&conn)?;
    Ok(conn)
}

/// Register `crc32(x)` as a deterministic scalar.
///
/// Matches MySQL CRC32 semantics: numeric arguments are hashed via their
/// decimal string form, NULL stays NULL.
fn register_crc32(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "crc32",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let checksum = match ctx.get_raw(0) {
                ValueRef::Null => return Ok(None),
                ValueRef::Integer(i) => crc32fast::hash(i.to_string().as_bytes()),
                ValueRef::Real(f) => crc32fast::hash(f.to_string().as_bytes()),
                ValueRef::Text(t) => crc32fast::hash(t),
                ValueRef::Blob(b) => crc32fast::hash(b),
            };
            Ok(Some(checksum as i64))
        },
    )
    .context("Failed to register crc32 function")
}

/// The value the `crc32` scalar produces for a local job id.
///
/// Exposed so shard assignment can be computed without a connection.
pub fn crc32_of_local_id(local_id: &str) -> u32 {
    crc32fast::hash(local_id.as_bytes())
}

/// Whether a statement failed because the connection itself is unhealthy,
/// as opposed to a constraint or programming error. Only these failures are
/// worth a reconnect-and-retry.
pub fn is_transient(error: &rusqlite::Error) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::SystemIoFailure
                | rusqlite::ErrorCode::CannotOpen
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_crc32_scalar_matches_host_hash() {
        let temp_dir = TempDir::new().unwrap();
        let settings = WarehouseSettings::new(temp_dir.path().join("warehouse.db"));
        let conn = open_connection(&settings).unwrap();

        let from_sql: i64 = conn
            .query_row("SELECT crc32('1234567')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(from_sql as u32, crc32_of_local_id("1234567"));
    }

    #[test]
    fn test_crc32_hashes_integers_as_decimal_text() {
        let temp_dir = TempDir::new().unwrap();
        let settings = WarehouseSettings::new(temp_dir.path().join("warehouse.db"));
        let conn = open_connection(&settings).unwrap();

        let text: i64 = conn
            .query_row("SELECT crc32('98')", [], |row| row.get(0))
            .unwrap();
        let integer: i64 = conn
            .query_row("SELECT crc32(98)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(text, integer);
    }

    #[test]
    fn test_crc32_null_passthrough() {
        let temp_dir = TempDir::new().unwrap();
        let settings = WarehouseSettings::new(temp_dir.path().join("warehouse.db"));
        let conn = open_connection(&settings).unwrap();

        let result: Option<i64> = conn
            .query_row("SELECT crc32(NULL)", [], |row| row.get(0))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_transient_classification() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_transient(&busy));

        let misuse = rusqlite::Error::InvalidQuery;
        assert!(!is_transient(&misuse));
    }
}
