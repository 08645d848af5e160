//! Write-back of per-job processing status.

use super::retry::RetryPolicy;
use super::status::ProcessStatus;
use crate::errors::ProcessingError;
use crate::warehouse::{open_connection, WarehouseSettings};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

const MARK_DONE_QUERY: &str = "
    INSERT INTO process (jobid, process_version, process_timestamp, process_time)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(jobid) DO UPDATE SET
        process_version = ?2,
        process_timestamp = ?3,
        process_time = ?4";

/// Records a job as processed, one row per job, last write wins.
///
/// The connection is opened lazily on the first write and reused. A
/// transient failure triggers exactly one reconnect-and-replay via the
/// retry policy; each statement commits before returning (autocommit).
pub struct StatusWriter {
    settings: WarehouseSettings,
    policy: RetryPolicy,
    conn: Option<Connection>,
}

impl StatusWriter {
    pub fn new(settings: WarehouseSettings) -> Self {
        Self::with_policy(settings, RetryPolicy::default())
    }

    pub fn with_policy(settings: WarehouseSettings, policy: RetryPolicy) -> Self {
        Self {
            settings,
            policy,
            conn: None,
        }
    }

    /// Upsert the status row for `job_pk`.
    ///
    /// `error` takes precedence over `success` when both are given, the
    /// same way the recorded version integer does.
    pub fn mark_as_done(
        &mut self,
        job_pk: i64,
        success: bool,
        elapsed_seconds: f64,
        error: Option<ProcessingError>,
    ) -> Result<()> {
        let version = ProcessStatus::from_outcome(success, error)
            .encode()
            .expect("an outcome always encodes to a version");
        let timestamp = Utc::now().to_rfc3339();

        if self.conn.is_none() {
            self.conn = Some(open_connection(&self.settings)?);
        }
        let settings = self.settings.clone();
        self.policy.run(
            self.conn.as_mut().unwrap(),
            || open_connection(&settings),
            |conn| {
                conn.execute(
                    MARK_DONE_QUERY,
                    params![job_pk, version, timestamp, elapsed_seconds],
                )
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::status::PROCESS_VERSION;
    use crate::warehouse::WAREHOUSE_SCHEMA;
    use tempfile::TempDir;

    struct TestWriter {
        writer: StatusWriter,
        conn: Connection,
        _temp_dir: TempDir,
    }

    fn create_test_writer() -> TestWriter {
        let temp_dir = TempDir::new().unwrap();
        let settings = WarehouseSettings::new(temp_dir.path().join("warehouse.db"));
        let conn = open_connection(&settings).unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();
        TestWriter {
            writer: StatusWriter::new(settings),
            conn,
            _temp_dir: temp_dir,
        }
    }

    fn status_row(conn: &Connection, job_pk: i64) -> (i64, Option<i64>, f64) {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM process WHERE jobid = ?1",
                [job_pk],
                |row| row.get(0),
            )
            .unwrap();
        let (version, elapsed): (Option<i64>, f64) = conn
            .query_row(
                "SELECT process_version, process_time FROM process WHERE jobid = ?1",
                [job_pk],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        (count, version, elapsed)
    }

    #[test]
    fn test_success_writes_current_version() {
        let mut test = create_test_writer();
        test.writer.mark_as_done(1, true, 3.5, None).unwrap();

        let (count, version, elapsed) = status_row(&test.conn, 1);
        assert_eq!(count, 1);
        assert_eq!(version, Some(PROCESS_VERSION));
        assert_eq!(elapsed, 3.5);
    }

    #[test]
    fn test_failure_writes_negated_version() {
        let mut test = create_test_writer();
        test.writer.mark_as_done(2, false, 1.0, None).unwrap();

        let (_, version, _) = status_row(&test.conn, 2);
        assert_eq!(version, Some(-PROCESS_VERSION));
    }

    #[test]
    fn test_error_kind_overrides_outcome() {
        let mut test = create_test_writer();
        test.writer
            .mark_as_done(3, false, 0.1, Some(ProcessingError::JobTooBig))
            .unwrap();

        let (_, version, _) = status_row(&test.conn, 3);
        assert_eq!(version, Some(-1008));
    }

    #[test]
    fn test_idempotent_under_repeated_calls() {
        let mut test = create_test_writer();
        test.writer.mark_as_done(7, true, 2.0, None).unwrap();
        let first = status_row(&test.conn, 7);
        test.writer.mark_as_done(7, true, 2.0, None).unwrap();
        let second = status_row(&test.conn, 7);

        assert_eq!(first.0, 1);
        assert_eq!(second.0, 1);
        assert_eq!(first.1, second.1);
        assert_eq!(first.2, second.2);
    }

    #[test]
    fn test_last_write_wins() {
        let mut test = create_test_writer();
        test.writer.mark_as_done(7, false, 12.5, None).unwrap();
        test.writer.mark_as_done(7, true, 9.0, None).unwrap();

        let (count, version, elapsed) = status_row(&test.conn, 7);
        assert_eq!(count, 1);
        assert_eq!(version, Some(PROCESS_VERSION));
        assert_eq!(elapsed, 9.0);
    }

    #[test]
    fn test_visible_without_explicit_commit() {
        // Statements run in autocommit mode; another connection must see
        // the row as soon as mark_as_done returns.
        let mut test = create_test_writer();
        test.writer.mark_as_done(9, true, 0.5, None).unwrap();

        let (count, _, _) = status_row(&test.conn, 9);
        assert_eq!(count, 1);
    }
}
