//! Accounting warehouse table definitions.
//!
//! Table and column names are a contract with the warehouse and every other
//! client connecting to it; they must not be renamed. The original schema
//! namespaces (`modw`, `modw_supremm`) collapse into the single SQLite
//! namespace here.

use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// One row per job reported by a resource manager.
const JOBFACT_TABLE: Table = Table {
    name: "jobfact",
    columns: &[
        Column::primary_key("job_id", SqlType::Integer),
        Column::non_null("resource_id", SqlType::Integer),
        Column::new("local_job_id_raw", SqlType::Integer),
        Column::new("local_jobid", SqlType::Integer),
        Column::non_null("start_time_ts", SqlType::Integer),
        Column::non_null("end_time_ts", SqlType::Integer),
        Column::new("submit_time_ts", SqlType::Integer),
        Column::new("eligible_time_ts", SqlType::Integer),
        Column::new("queue_id", SqlType::Text),
        Column::new("uid_number", SqlType::Integer),
        Column::new("gid_number", SqlType::Integer),
        Column::non_null("systemaccount_id", SqlType::Integer),
        Column::non_null("account_id", SqlType::Integer),
        Column::new("name", SqlType::Text),
        Column::new("nodecount", SqlType::Integer),
        Column::new("processors", SqlType::Integer),
        Column::new("group_name", SqlType::Text),
        Column::new("exit_code", SqlType::Text),
        Column::new("exit_state", SqlType::Text),
        Column::new("cpu_req", SqlType::Integer),
        Column::new("mem_req", SqlType::Text),
        Column::new("timelimit", SqlType::Integer),
    ],
    indices: &[
        ("idx_jobfact_resource_end", "resource_id, end_time_ts"),
        ("idx_jobfact_local_job_id_raw", "local_job_id_raw"),
    ],
    unique_constraints: &[],
};

const SYSTEMACCOUNT_TABLE: Table = Table {
    name: "systemaccount",
    columns: &[
        Column::primary_key("id", SqlType::Integer),
        Column::non_null("username", SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ACCOUNT_TABLE: Table = Table {
    name: "account",
    columns: &[
        Column::primary_key("id", SqlType::Integer),
        Column::non_null("charge_number", SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const HOSTS_TABLE: Table = Table {
    name: "hosts",
    columns: &[
        Column::primary_key("id", SqlType::Integer),
        Column::non_null("hostname", SqlType::Text),
    ],
    indices: &[("idx_hosts_hostname", "hostname")],
    unique_constraints: &[&["hostname"]],
};

/// Which hosts each job ran on.
const JOBHOSTS_TABLE: Table = Table {
    name: "jobhosts",
    columns: &[
        Column::non_null("job_id", SqlType::Integer),
        Column::non_null("host_id", SqlType::Integer),
    ],
    indices: &[("idx_jobhosts_host_id", "host_id")],
    unique_constraints: &[&["job_id", "host_id"]],
};

/// Per-job processing status, one row per attempted job.
const PROCESS_TABLE: Table = Table {
    name: "process",
    columns: &[
        Column::primary_key("jobid", SqlType::Integer),
        Column::new("process_version", SqlType::Integer),
        Column::new("process_timestamp", SqlType::Text),
        Column::new("process_time", SqlType::Real),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// Canonical archive file paths; everything else references these by id.
const ARCHIVE_PATHS_TABLE: Table = Table {
    name: "archive_paths",
    columns: &[
        Column::primary_key("id", SqlType::Integer),
        Column::non_null("filename", SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[&["filename"]],
};

/// Archives covering a host over a wall-clock window, no job affinity.
const ARCHIVES_NODELEVEL_TABLE: Table = Table {
    name: "archives_nodelevel",
    columns: &[
        Column::non_null("archive_id", SqlType::Integer),
        Column::non_null("host_id", SqlType::Integer),
        Column::non_null("start_time_ts", SqlType::Integer),
        Column::non_null("end_time_ts", SqlType::Integer),
    ],
    indices: &[("idx_archives_nodelevel_host", "host_id, start_time_ts")],
    unique_constraints: &[&["archive_id", "host_id"]],
};

/// Archives explicitly tagged with the job they were captured for.
const ARCHIVES_JOBLEVEL_TABLE: Table = Table {
    name: "archives_joblevel",
    columns: &[
        Column::non_null("archive_id", SqlType::Integer),
        Column::non_null("host_id", SqlType::Integer),
        Column::non_null("local_job_id_raw", SqlType::Integer),
        Column::non_null("start_time_ts", SqlType::Integer),
        Column::non_null("end_time_ts", SqlType::Integer),
    ],
    indices: &[("idx_archives_joblevel_local_id", "local_job_id_raw")],
    unique_constraints: &[&["archive_id", "host_id", "local_job_id_raw"]],
};

pub const WAREHOUSE_SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[
        JOBFACT_TABLE,
        SYSTEMACCOUNT_TABLE,
        ACCOUNT_TABLE,
        HOSTS_TABLE,
        JOBHOSTS_TABLE,
        PROCESS_TABLE,
        ARCHIVE_PATHS_TABLE,
        ARCHIVES_NODELEVEL_TABLE,
        ARCHIVES_JOBLEVEL_TABLE,
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();
        WAREHOUSE_SCHEMA.validate(&conn).unwrap();
    }

    #[test]
    fn test_archive_conflict_targets_exist() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();

        // The registrar's upserts name these conflict targets; they only
        // bind when the matching UNIQUE constraints are present.
        conn.execute(
            "INSERT INTO archive_paths (filename) VALUES ('a') ON CONFLICT(filename) DO NOTHING",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO archives_nodelevel (archive_id, host_id, start_time_ts, end_time_ts)
             VALUES (1, 1, 0, 1)
             ON CONFLICT(archive_id, host_id) DO UPDATE SET end_time_ts = excluded.end_time_ts",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO archives_joblevel (archive_id, host_id, local_job_id_raw, start_time_ts, end_time_ts)
             VALUES (1, 1, 10, 0, 1)
             ON CONFLICT(archive_id, host_id, local_job_id_raw) DO UPDATE SET end_time_ts = excluded.end_time_ts",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_process_upsert_target() {
        let conn = Connection::open_in_memory().unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();
        conn.execute(
            "INSERT INTO process (jobid, process_version) VALUES (1, 4)
             ON CONFLICT(jobid) DO UPDATE SET process_version = excluded.process_version",
            [],
        )
        .unwrap();
    }
}
