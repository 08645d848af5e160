//! Archive correlation: which archive files cover a job's run, per host.
//!
//! Two index sources are unioned. Node-level archives match when the job
//! window overlaps the archive window in any of the three possible ways;
//! job-level archives are already tagged with the job's local id and match
//! by equality alone. Rows come back ordered by hostname then window start,
//! which fixes the per-host file order downstream consumers rely on for
//! time-series reconstruction.

use super::job::ArchiveCorrelation;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;

const ARCHIVE_QUERY: &str = "
    SELECT tt.hostname, tt.filename
    FROM (
        SELECT
            h.hostname AS hostname, ap.filename AS filename, na.start_time_ts AS start_time_ts
        FROM
            archive_paths ap, archives_nodelevel na, hosts h, jobhosts jh, jobfact j
        WHERE
            j.job_id = jh.job_id
            AND jh.job_id = ?1
            AND jh.host_id = h.id
            AND na.host_id = h.id
            AND ((j.start_time_ts BETWEEN na.start_time_ts AND na.end_time_ts)
                OR (j.end_time_ts BETWEEN na.start_time_ts AND na.end_time_ts)
                OR (j.start_time_ts < na.start_time_ts AND j.end_time_ts > na.end_time_ts))
            AND ap.id = na.archive_id
        UNION
        SELECT
            h.hostname, ap.filename, ja.start_time_ts
        FROM
            archive_paths ap, archives_joblevel ja, hosts h, jobhosts jh, jobfact j
        WHERE
            j.job_id = jh.job_id
            AND jh.job_id = ?1
            AND jh.host_id = h.id
            AND ja.host_id = h.id
            AND ja.local_job_id_raw = j.local_job_id_raw
            AND ja.archive_id = ap.id
    ) tt ORDER BY 1 ASC, tt.start_time_ts ASC";

pub struct ArchiveCorrelator {
    conn: Connection,
}

impl ArchiveCorrelator {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Hosts and archive filenames covering the job identified by `job_pk`.
    pub fn correlate(&self, job_pk: i64) -> Result<ArchiveCorrelation> {
        let mut stmt = self
            .conn
            .prepare_cached(ARCHIVE_QUERY)
            .context("Failed to prepare archive correlation query")?;
        let rows = stmt.query_map([job_pk], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut host_list: Vec<String> = Vec::new();
        let mut archives_by_host: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (hostname, filename) = row?;
            match archives_by_host.get_mut(&hostname) {
                Some(files) => files.push(filename),
                None => {
                    host_list.push(hostname.clone());
                    archives_by_host.insert(hostname, vec![filename]);
                }
            }
        }

        Ok(ArchiveCorrelation {
            host_list,
            archives_by_host,
        })
    }
}
