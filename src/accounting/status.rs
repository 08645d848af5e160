//! Decoded view of the `process.process_version` column.
//!
//! The warehouse packs a job's whole processing outcome into one signed
//! integer: positive means summarized successfully with that pipeline
//! version, negative (down to -999) means the summarization failed under
//! that version, and anything at or below -1000 carries a
//! [`ProcessingError`](crate::errors::ProcessingError) code as
//! `-1000 - code`. NULL means never attempted. Everything inside this crate
//! works with the tagged form; the raw integer only exists at the SQL
//! boundary.

use crate::errors::ProcessingError;

/// Version stamp written by the current summarization pipeline.
pub const PROCESS_VERSION: i64 = 4;

/// Raw values at or below this carry an error code rather than a version.
const ERROR_FLOOR: i64 = -1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// No status row / NULL version: the job was never processed.
    Unprocessed,
    /// Processed successfully by pipeline version `version`.
    Success { version: i64 },
    /// Processing was attempted by pipeline version `version` and failed.
    Failure { version: i64 },
    /// Processing was skipped or aborted for a classified reason.
    Error { code: i64 },
}

impl ProcessStatus {
    /// Status value for an outcome produced by the current pipeline.
    pub fn from_outcome(success: bool, error: Option<ProcessingError>) -> Self {
        match error {
            Some(e) => ProcessStatus::Error { code: e.code() },
            None if success => ProcessStatus::Success {
                version: PROCESS_VERSION,
            },
            None => ProcessStatus::Failure {
                version: PROCESS_VERSION,
            },
        }
    }

    /// The legacy integer representation, `None` for [`Unprocessed`].
    ///
    /// [`Unprocessed`]: ProcessStatus::Unprocessed
    pub fn encode(&self) -> Option<i64> {
        match self {
            ProcessStatus::Unprocessed => None,
            ProcessStatus::Success { version } => Some(*version),
            ProcessStatus::Failure { version } => Some(-version),
            ProcessStatus::Error { code } => Some(ERROR_FLOOR - code),
        }
    }

    pub fn decode(raw: Option<i64>) -> Self {
        match raw {
            None => ProcessStatus::Unprocessed,
            Some(v) if v > 0 => ProcessStatus::Success { version: v },
            Some(v) if v <= ERROR_FLOOR => ProcessStatus::Error {
                code: ERROR_FLOOR - v,
            },
            Some(v) => ProcessStatus::Failure { version: -v },
        }
    }

    /// True when the job was successfully processed by the current pipeline.
    pub fn is_current(&self) -> bool {
        matches!(self, ProcessStatus::Success { version } if *version == PROCESS_VERSION)
    }

    /// The classified error kind, when one is recorded and known.
    pub fn processing_error(&self) -> Option<ProcessingError> {
        match self {
            ProcessStatus::Error { code } => ProcessingError::from_code(*code),
            _ => None,
        }
    }
}
