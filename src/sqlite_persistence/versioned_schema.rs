//! Typed schema definitions with creation and validation.
//!
//! Tables are declared as consts, created in one shot on a fresh database,
//! and validated column-by-column (PRAGMA table_info) against an existing
//! one. The schema version is stamped into `user_version`.

use anyhow::{bail, Result};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub non_null: bool,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
            non_null: false,
        }
    }

    pub const fn primary_key(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: true,
            non_null: false,
        }
    }

    pub const fn non_null(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
            non_null: true,
        }
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// `(index_name, column_list)` pairs.
    pub indices: &'static [(&'static str, &'static str)],
    /// Column groups carrying a table-level UNIQUE constraint. These are the
    /// upsert conflict targets, so they must exist for ON CONFLICT to bind.
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut columns_sql: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                let mut sql = format!("{} {}", column.name, column.sql_type.as_sql());
                if column.primary_key {
                    sql.push_str(" PRIMARY KEY");
                }
                if column.non_null {
                    sql.push_str(" NOT NULL");
                }
                sql
            })
            .collect();
        for unique in self.unique_constraints {
            columns_sql.push(format!("UNIQUE ({})", unique.join(", ")));
        }
        conn.execute(
            &format!("CREATE TABLE {} ({})", self.name, columns_sql.join(", ")),
            [],
        )?;
        for (index_name, column_list) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({})",
                    index_name, self.name, column_list
                ),
                [],
            )?;
        }
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        struct ActualColumn {
            name: String,
            sql_type: Option<SqlType>,
            non_null: bool,
            primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", self.name))?;
        let actual: Vec<ActualColumn> = stmt
            .query_map([], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: SqlType::parse(&row.get::<_, String>(2)?),
                    non_null: row.get::<_, i32>(3)? == 1,
                    primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        if actual.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}",
                self.name,
                actual.len(),
                self.columns.len()
            );
        }
        for (found, expected) in actual.iter().zip(self.columns.iter()) {
            if found.name != expected.name {
                bail!(
                    "Table {}: expected column {}, found {}",
                    self.name,
                    expected.name,
                    found.name
                );
            }
            if found.sql_type != Some(expected.sql_type) {
                bail!(
                    "Table {} column {}: type mismatch (expected {:?})",
                    self.name,
                    expected.name,
                    expected.sql_type
                );
            }
            if found.non_null != expected.non_null || found.primary_key != expected.primary_key {
                bail!(
                    "Table {} column {}: constraint mismatch",
                    self.name,
                    expected.name
                );
            }
        }

        for (index_name, _) in self.indices {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 AND tbl_name = ?2",
                    rusqlite::params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !exists {
                bail!("Table {} is missing index {}", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: i64,
    pub tables: &'static [Table],
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(&format!("PRAGMA user_version = {}", self.version), [])?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != self.version {
            bail!(
                "Database schema version {} does not match expected {}",
                version,
                self.version
            );
        }
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TABLE: Table = Table {
        name: "things",
        columns: &[
            Column::primary_key("id", SqlType::Integer),
            Column::non_null("name", SqlType::Text),
            Column::new("weight", SqlType::Real),
        ],
        indices: &[("idx_things_name", "name")],
        unique_constraints: &[&["name", "weight"]],
    };

    const TEST_SCHEMA: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[TEST_TABLE],
    };

    #[test]
    fn test_create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();
        TEST_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE things (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_things_name ON things(name)", [])
            .unwrap();
        conn.execute("PRAGMA user_version = 1", []).unwrap();

        let result = TEST_SCHEMA.validate(&conn);
        assert!(result.unwrap_err().to_string().contains("columns"));
    }

    #[test]
    fn test_validate_rejects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE things (id INTEGER PRIMARY KEY, name TEXT NOT NULL, weight REAL, UNIQUE (name, weight))",
            [],
        )
        .unwrap();
        conn.execute("PRAGMA user_version = 1", []).unwrap();

        let result = TEST_SCHEMA.validate(&conn);
        assert!(result.unwrap_err().to_string().contains("missing index"));
    }

    #[test]
    fn test_validate_rejects_version_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();
        conn.execute("PRAGMA user_version = 7", []).unwrap();

        assert!(TEST_SCHEMA.validate(&conn).is_err());
    }

    #[test]
    fn test_unique_constraint_is_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        TEST_SCHEMA.create(&conn).unwrap();

        conn.execute(
            "INSERT INTO things (name, weight) VALUES ('a', 1.0)",
            [],
        )
        .unwrap();
        let duplicate = conn.execute("INSERT INTO things (name, weight) VALUES ('a', 1.0)", []);
        assert!(duplicate.is_err());
    }
}
