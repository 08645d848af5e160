//! Bounded reconnect-and-retry for the warehouse write paths.
//!
//! The historical behavior is a single reconnect followed by one replay of
//! the failed operation; that stays the default (`max_attempts = 1`,
//! no backoff), but as an explicit policy value rather than control flow.

use crate::warehouse::connection::is_transient;
use anyhow::Result;
use rusqlite::Connection;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Reconnect-and-replay attempts after the initial failure.
    pub max_attempts: u32,
    /// Pause before each reconnect.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Run `op` against `conn`; on a transient failure, reconnect through
    /// `reconnect` and replay, up to `max_attempts` times. Non-transient
    /// failures and exhausted retries propagate.
    pub fn run<T>(
        &self,
        conn: &mut Connection,
        reconnect: impl Fn() -> Result<Connection>,
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op(conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    attempt += 1;
                    warn!(
                        "Lost warehouse connection ({}). Reconnect attempt {}/{}",
                        e, attempt, self.max_attempts
                    );
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                    *conn = reconnect()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
