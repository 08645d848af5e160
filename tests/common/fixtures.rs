use rusqlite::{params, Connection};
use tempfile::TempDir;
use warehouse_accounting::warehouse::{open_connection, WarehouseSettings, WAREHOUSE_SCHEMA};

pub const RESOURCE_ID: i64 = 13;

pub struct SeededJob {
    pub job_id: i64,
    pub local_id: i64,
    pub start: i64,
    pub end: i64,
    pub hosts: &'static [&'static str],
}

/// A scratch warehouse with its schema created and one account seeded.
pub struct TestWarehouse {
    pub settings: WarehouseSettings,
    pub conn: Connection,
    _temp_dir: TempDir,
}

impl TestWarehouse {
    pub fn create() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let settings = WarehouseSettings::new(temp_dir.path().join("warehouse.db"));
        let conn = open_connection(&settings).unwrap();
        WAREHOUSE_SCHEMA.create(&conn).unwrap();
        conn.execute(
            "INSERT INTO systemaccount (id, username) VALUES (1, 'alice')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO account (id, charge_number) VALUES (1, 'abc123')",
            [],
        )
        .unwrap();
        Self {
            settings,
            conn,
            _temp_dir: temp_dir,
        }
    }

    /// Insert a job and link it to its hosts, creating hosts on demand.
    pub fn seed_job(&self, job: &SeededJob) {
        self.conn
            .execute(
                "INSERT INTO jobfact (job_id, resource_id, local_job_id_raw, local_jobid,
                                      start_time_ts, end_time_ts, submit_time_ts,
                                      systemaccount_id, account_id, name, nodecount, processors)
                 VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?4, 1, 1, 'batch_job', ?6, 8)",
                params![
                    job.job_id,
                    RESOURCE_ID,
                    job.local_id,
                    job.start,
                    job.end,
                    job.hosts.len() as i64
                ],
            )
            .unwrap();
        for host in job.hosts {
            self.conn
                .execute(
                    "INSERT INTO hosts (hostname) VALUES (?1) ON CONFLICT(hostname) DO NOTHING",
                    params![host],
                )
                .unwrap();
            self.conn
                .execute(
                    "INSERT INTO jobhosts (job_id, host_id)
                     VALUES (?1, (SELECT id FROM hosts WHERE hostname = ?2))",
                    params![job.job_id, host],
                )
                .unwrap();
        }
    }

    pub fn count(&self, table: &str) -> i64 {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    pub fn process_version(&self, job_id: i64) -> Option<i64> {
        self.conn
            .query_row(
                "SELECT process_version FROM process WHERE jobid = ?1",
                [job_id],
                |row| row.get(0),
            )
            .unwrap()
    }
}
