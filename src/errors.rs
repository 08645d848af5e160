//! Processing outcome taxonomy.
//!
//! These are domain statuses recorded against a job, not runtime errors:
//! they are arithmetically folded into the `process_version` integer by the
//! status writer and never raised.

/// Why a job's performance data could not be summarized.
///
/// The integer codes are part of the warehouse contract (they are stored as
/// `-1000 - code` in `process.process_version`) and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingError {
    RawCounterUnavailable = 1,
    JobTooShort = 2,
    InsufficientData = 3,
    InsufficientHostData = 4,
    CpusetUnknown = 5,
    JobTooLong = 6,
    TimeTooShort = 7,
    JobTooBig = 8,
    TimeTooLong = 9,
}

impl ProcessingError {
    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ProcessingError::RawCounterUnavailable),
            2 => Some(ProcessingError::JobTooShort),
            3 => Some(ProcessingError::InsufficientData),
            4 => Some(ProcessingError::InsufficientHostData),
            5 => Some(ProcessingError::CpusetUnknown),
            6 => Some(ProcessingError::JobTooLong),
            7 => Some(ProcessingError::TimeTooShort),
            8 => Some(ProcessingError::JobTooBig),
            9 => Some(ProcessingError::TimeTooLong),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingError::RawCounterUnavailable => "raw_counter_unavailable",
            ProcessingError::JobTooShort => "job_too_short",
            ProcessingError::InsufficientData => "insufficient_data",
            ProcessingError::InsufficientHostData => "insufficient_host_data",
            ProcessingError::CpusetUnknown => "cpuset_unknown",
            ProcessingError::JobTooLong => "job_too_long",
            ProcessingError::TimeTooShort => "time_too_short",
            ProcessingError::JobTooBig => "job_too_big",
            ProcessingError::TimeTooLong => "time_too_long",
        }
    }
}
