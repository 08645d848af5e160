//! Archive registration: the write path fed by the archive-discovery
//! process.
//!
//! Inserts run inside an open transaction that the caller closes with
//! [`ArchiveCache::post_insert`], so several discovered files can be
//! registered per commit. Hostnames are checked against a cache loaded once
//! at construction; archives for hosts the warehouse has never seen a job
//! on are dropped, not stored.

use super::retry::RetryPolicy;
use crate::warehouse::{open_connection, WarehouseSettings};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use tracing::debug;

const JOBLEVEL_UPSERT: &str = "
    INSERT INTO archives_joblevel
        (archive_id, host_id, local_job_id_raw, start_time_ts, end_time_ts)
    VALUES (?1, (SELECT id FROM hosts WHERE hostname = ?2), ?3, ?4, ?5)
    ON CONFLICT(archive_id, host_id, local_job_id_raw) DO UPDATE SET
        start_time_ts = excluded.start_time_ts,
        end_time_ts = excluded.end_time_ts";

const NODELEVEL_UPSERT: &str = "
    INSERT INTO archives_nodelevel
        (archive_id, host_id, start_time_ts, end_time_ts)
    VALUES (?1, (SELECT id FROM hosts WHERE hostname = ?2), ?3, ?4)
    ON CONFLICT(archive_id, host_id) DO UPDATE SET
        start_time_ts = excluded.start_time_ts,
        end_time_ts = excluded.end_time_ts";

pub struct ArchiveCache {
    settings: WarehouseSettings,
    policy: RetryPolicy,
    conn: Connection,
    hostnames: HashSet<String>,
}

impl ArchiveCache {
    pub fn new(settings: WarehouseSettings) -> Result<Self> {
        Self::with_policy(settings, RetryPolicy::default())
    }

    pub fn with_policy(settings: WarehouseSettings, policy: RetryPolicy) -> Result<Self> {
        let conn = open_connection(&settings)?;
        let hostnames = load_hostnames(&conn)?;
        Ok(Self {
            settings,
            policy,
            conn,
            hostnames,
        })
    }

    /// Register one archive file's coverage window.
    ///
    /// `job_id` present means a job-scoped archive; absent means a
    /// node-level archive. Re-registering the same file overwrites the
    /// stored window. The write is left uncommitted until
    /// [`post_insert`](Self::post_insert).
    pub fn insert(
        &mut self,
        _resource_id: i64,
        hostname: &str,
        filename: &str,
        start: f64,
        end: f64,
        job_id: Option<i64>,
    ) -> Result<()> {
        if !self.hostnames.contains(hostname) {
            debug!(
                "Ignoring archive for host \"{}\" because there are no jobs in the warehouse that ran on this host.",
                hostname
            );
            return Ok(());
        }

        let settings = self.settings.clone();
        self.policy.run(
            &mut self.conn,
            || open_connection(&settings),
            |conn| insert_impl(conn, hostname, filename, start, end, job_id),
        )
    }

    /// Commit everything registered since the last call. Must be called
    /// after a batch of inserts; without it the registrations are lost with
    /// the connection.
    pub fn post_insert(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .context("Failed to commit archive registrations")?;
        }
        Ok(())
    }

    /// Hosts known at startup. New hosts added to the warehouse afterwards
    /// stay invisible until the process restarts.
    pub fn known_hosts(&self) -> usize {
        self.hostnames.len()
    }
}

fn load_hostnames(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT hostname FROM hosts")?;
    let hostnames = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(hostnames)
}

fn insert_impl(
    conn: &Connection,
    hostname: &str,
    filename: &str,
    start: f64,
    end: f64,
    job_id: Option<i64>,
) -> rusqlite::Result<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN")?;
    }

    conn.execute(
        "INSERT INTO archive_paths (filename) VALUES (?1) ON CONFLICT(filename) DO NOTHING",
        params![filename],
    )?;
    // A fresh insert hands us the id directly; a duplicate costs a lookup.
    let archive_id: i64 = if conn.changes() > 0 {
        conn.last_insert_rowid()
    } else {
        conn.query_row(
            "SELECT id FROM archive_paths WHERE filename = ?1",
            params![filename],
            |row| row.get(0),
        )?
    };

    let start_ts = start.floor() as i64;
    let end_ts = end.ceil() as i64;
    match job_id {
        Some(job_id) => conn.execute(
            JOBLEVEL_UPSERT,
            params![archive_id, hostname, job_id, start_ts, end_ts],
        )?,
        None => conn.execute(
            NODELEVEL_UPSERT,
            params![archive_id, hostname, start_ts, end_ts],
        )?,
    };
    Ok(())
}
