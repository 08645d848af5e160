pub mod connection;
pub mod schema;

pub use connection::{open_connection, WarehouseSettings};
pub use schema::WAREHOUSE_SCHEMA;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Open the warehouse, creating the schema on a fresh database and
/// validating it on an existing one.
pub fn open_warehouse(settings: &WarehouseSettings) -> Result<Connection> {
    let is_new_db = !settings.db_path.exists();
    let conn = open_connection(settings)?;
    if is_new_db {
        info!("Creating new warehouse database at {:?}", settings.db_path);
        WAREHOUSE_SCHEMA.create(&conn)?;
    } else {
        WAREHOUSE_SCHEMA.validate(&conn).with_context(|| {
            format!(
                "Warehouse schema validation failed for {:?}",
                settings.db_path
            )
        })?;
    }
    Ok(conn)
}
