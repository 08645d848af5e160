//! Job selection: filtered, sharded queries over the job-fact table.
//!
//! The read path is pull-driven: each fact row is correlated against its
//! archives (on a second, lazily opened connection) before the next row is
//! fetched, so memory stays bounded by one job's archive set. Connection
//! loss during iteration is not retried here; the caller re-queries
//! unprocessed jobs to resume.

use super::correlator::ArchiveCorrelator;
use super::job::{Job, JobAttributes};
use super::predicate::Predicate;
use super::status::PROCESS_VERSION;
use crate::errors::ProcessingError;
use crate::warehouse::{open_connection, WarehouseSettings};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use thiserror::Error;
use tracing::info;

/// Which previously-recorded statuses make a job eligible again.
///
/// Enabled filters combine with OR. With none enabled (and `process_all`
/// false) no status restriction is applied at all, selecting every job in
/// the window; that fallback is intentional, ALL and NONE are the same
/// query.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Ignore every other flag and select the whole window.
    pub process_all: bool,
    /// Failed under some pipeline version (no classified error).
    pub process_bad: bool,
    /// Succeeded under an older pipeline version.
    pub process_old: bool,
    /// Never attempted.
    pub process_notdone: bool,
    /// Succeeded under the current pipeline version.
    pub process_current: bool,
    /// Previously skipped as too big.
    pub process_big: bool,
    /// Exact raw version value to match; 0 disables this filter.
    pub process_error: i64,
}

impl FilterOptions {
    /// The OR-alternatives for the process-status filter, empty when no
    /// flag is enabled or `process_all` is set.
    fn status_alternatives(&self) -> Vec<(String, Vec<Value>)> {
        let mut alternatives: Vec<(String, Vec<Value>)> = Vec::new();
        if self.process_all {
            info!("Processing all jobs");
            return alternatives;
        }
        if self.process_bad {
            info!("Processing bad jobs");
            alternatives.push((
                "(p.process_version < 0 AND p.process_version > -1000)".to_string(),
                vec![],
            ));
        }
        if self.process_old {
            info!("Processing old jobs");
            alternatives.push((
                "(p.process_version > 0 AND p.process_version != ?)".to_string(),
                vec![Value::Integer(PROCESS_VERSION)],
            ));
        }
        if self.process_notdone {
            info!("Processing unprocessed jobs");
            alternatives.push(("p.process_version IS NULL".to_string(), vec![]));
        }
        if self.process_current {
            info!("Processing processed jobs");
            alternatives.push((
                "p.process_version = ?".to_string(),
                vec![Value::Integer(PROCESS_VERSION)],
            ));
        }
        if self.process_big {
            info!("Processing jobs marked previously as too big");
            alternatives.push((
                "p.process_version = ?".to_string(),
                vec![Value::Integer(-1000 - ProcessingError::JobTooBig.code())],
            ));
        }
        if self.process_error != 0 {
            info!(
                "Processing jobs marked previously with {}",
                self.process_error
            );
            alternatives.push((
                "p.process_version = ?".to_string(),
                vec![Value::Integer(self.process_error)],
            ));
        }
        alternatives
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardConfigError {
    #[error("worker count and worker index must be specified together")]
    Partial,
    #[error("worker count must be greater than zero")]
    ZeroWorkers,
    #[error("worker index {index} is out of range for {workers} workers")]
    IndexOutOfRange { index: u32, workers: u32 },
}

/// Disjoint partition assignment for one worker out of `workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub workers: u32,
    pub index: u32,
}

impl ShardSpec {
    pub fn new(workers: u32, index: u32) -> Result<Self, ShardConfigError> {
        if workers == 0 {
            return Err(ShardConfigError::ZeroWorkers);
        }
        if index >= workers {
            return Err(ShardConfigError::IndexOutOfRange { index, workers });
        }
        Ok(Self { workers, index })
    }

    /// Both-or-neither: a lone count or index is a configuration error,
    /// not something to silently ignore.
    pub fn from_options(
        workers: Option<u32>,
        index: Option<u32>,
    ) -> Result<Option<Self>, ShardConfigError> {
        match (workers, index) {
            (None, None) => Ok(None),
            (Some(workers), Some(index)) => Self::new(workers, index).map(Some),
            _ => Err(ShardConfigError::Partial),
        }
    }
}

const JOB_QUERY: &str = "
    SELECT
        jf.job_id AS job_id,
        COALESCE(jf.local_job_id_raw, jf.local_jobid) AS local_job_id,
        jf.start_time_ts AS start_time,
        jf.end_time_ts AS end_time,
        jf.submit_time_ts AS submit,
        jf.eligible_time_ts AS eligible,
        jf.queue_id AS \"partition\",
        jf.uid_number AS uid,
        aa.charge_number AS account,
        sa.username AS user,
        jf.name AS jobname,
        jf.nodecount AS nodes,
        jf.processors AS ncpus,
        jf.group_name AS \"group\",
        jf.gid_number AS gid,
        jf.exit_code AS exit_code,
        jf.exit_state AS exit_status,
        jf.cpu_req AS reqcpus,
        jf.mem_req AS reqmem,
        jf.timelimit AS timelimit
    FROM
        jobfact jf
    LEFT JOIN
        process p ON jf.job_id = p.jobid
    INNER JOIN
        systemaccount sa ON jf.systemaccount_id = sa.id
    INNER JOIN
        account aa ON jf.account_id = aa.id
    WHERE
        jf.resource_id = ?";

pub struct JobSelector {
    settings: WarehouseSettings,
    resource_id: i64,
    shard: Option<ShardSpec>,
    conn: Option<Connection>,
    correlator: Option<ArchiveCorrelator>,
}

impl JobSelector {
    pub fn new(settings: WarehouseSettings, resource_id: i64, shard: Option<ShardSpec>) -> Self {
        Self {
            settings,
            resource_id,
            shard,
            conn: None,
            correlator: None,
        }
    }

    /// Jobs whose raw local identifier matches exactly.
    pub fn for_each_by_local_id(
        &mut self,
        local_id: &str,
        f: impl FnMut(Job) -> Result<()>,
    ) -> Result<()> {
        let mut predicate = Predicate::new();
        let param = local_id
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(local_id.to_string()));
        predicate.and("jf.local_job_id_raw = ?", [param]);
        self.apply_shard(&mut predicate);
        self.for_each_selected(predicate, false, f)
    }

    pub fn select_by_local_id(&mut self, local_id: &str) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        self.for_each_by_local_id(local_id, |job| {
            jobs.push(job);
            Ok(())
        })?;
        Ok(jobs)
    }

    /// Jobs whose end time falls within `[start, end]`, restricted by the
    /// enabled status filters, ordered by end time ascending.
    pub fn for_each_by_time_range(
        &mut self,
        start: i64,
        end: i64,
        filter: &FilterOptions,
        f: impl FnMut(Job) -> Result<()>,
    ) -> Result<()> {
        info!("Using time interval: {} - {}", start, end);

        let mut predicate = Predicate::new();
        predicate.and(
            "jf.end_time_ts BETWEEN ? AND ?",
            [Value::Integer(start), Value::Integer(end)],
        );
        predicate.and_any(filter.status_alternatives());
        self.apply_shard(&mut predicate);
        self.for_each_selected(predicate, true, f)
    }

    pub fn select_by_time_range(
        &mut self,
        start: i64,
        end: i64,
        filter: &FilterOptions,
    ) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        self.for_each_by_time_range(start, end, filter, |job| {
            jobs.push(job);
            Ok(())
        })?;
        Ok(jobs)
    }

    /// Jobs that were never processed, optionally bounded by end time on
    /// either side, ordered by end time ascending.
    pub fn for_each_unprocessed(
        &mut self,
        start: Option<i64>,
        end: Option<i64>,
        f: impl FnMut(Job) -> Result<()>,
    ) -> Result<()> {
        let mut predicate = Predicate::new();
        predicate.and("p.process_version IS NULL", []);
        if let Some(start) = start {
            predicate.and("jf.end_time_ts >= ?", [Value::Integer(start)]);
        }
        if let Some(end) = end {
            predicate.and("jf.end_time_ts < ?", [Value::Integer(end)]);
        }
        self.apply_shard(&mut predicate);
        self.for_each_selected(predicate, true, f)
    }

    pub fn select_unprocessed(
        &mut self,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        self.for_each_unprocessed(start, end, |job| {
            jobs.push(job);
            Ok(())
        })?;
        Ok(jobs)
    }

    fn apply_shard(&self, predicate: &mut Predicate) {
        if let Some(shard) = self.shard {
            predicate.and(
                "(crc32(jf.local_job_id_raw) % ?) = ?",
                [
                    Value::Integer(shard.workers as i64),
                    Value::Integer(shard.index as i64),
                ],
            );
        }
    }

    fn ensure_connections(&mut self) -> Result<()> {
        if self.conn.is_none() {
            self.conn = Some(open_connection(&self.settings)?);
        }
        if self.correlator.is_none() {
            self.correlator = Some(ArchiveCorrelator::new(open_connection(&self.settings)?));
        }
        Ok(())
    }

    fn for_each_selected(
        &mut self,
        predicate: Predicate,
        order_by_end_time: bool,
        mut f: impl FnMut(Job) -> Result<()>,
    ) -> Result<()> {
        self.ensure_connections()?;
        let conn = self.conn.as_ref().unwrap();
        let correlator = self.correlator.as_ref().unwrap();

        let mut sql = String::from(JOB_QUERY);
        sql.push_str(&predicate.sql_suffix());
        if order_by_end_time {
            sql.push_str(" ORDER BY jf.end_time_ts ASC");
        }

        let mut params: Vec<Value> = Vec::with_capacity(predicate.params().len() + 1);
        params.push(Value::Integer(self.resource_id));
        params.extend(predicate.into_params());

        let mut stmt = conn
            .prepare(&sql)
            .context("Failed to prepare job selection query")?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut count = 0usize;
        while let Some(row) = rows.next()? {
            let (job_pk, local_job_id, attributes) = row_to_fact(row)?;
            let correlation = correlator.correlate(job_pk)?;
            f(Job::assemble(job_pk, local_job_id, attributes, correlation))?;
            count += 1;
        }
        info!("Processed {} jobs", count);
        Ok(())
    }
}

fn row_to_fact(row: &Row) -> Result<(i64, String, JobAttributes)> {
    let job_pk: i64 = row.get("job_id")?;
    let local_job_id = row
        .get::<_, Option<i64>>("local_job_id")?
        .map(|id| id.to_string())
        .unwrap_or_default();
    let attributes = JobAttributes {
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        submit: row.get("submit")?,
        eligible: row.get("eligible")?,
        partition: row.get("partition")?,
        uid: row.get("uid")?,
        gid: row.get("gid")?,
        account: row.get("account")?,
        user: row.get("user")?,
        group: row.get("group")?,
        jobname: row.get("jobname")?,
        nodes: row.get("nodes")?,
        ncpus: row.get("ncpus")?,
        reqcpus: row.get("reqcpus")?,
        reqmem: row.get("reqmem")?,
        timelimit: row.get("timelimit")?,
        exit_code: row.get("exit_code")?,
        exit_status: row.get("exit_status")?,
    };
    Ok((job_pk, local_job_id, attributes))
}
