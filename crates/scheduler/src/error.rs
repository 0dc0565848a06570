//! Scheduler-level error types.

use thiserror::Error;

/// Errors produced while building or driving scheduled jobs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// The timezone is not a known IANA zone name.
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    /// The expression parses but never matches a real date (e.g. Feb 30).
    #[error("cron expression '{0}' has no upcoming fire time")]
    NeverFires(String),

    /// A repeat interval of zero was requested.
    #[error("interval must be greater than zero")]
    InvalidInterval,

    /// No job is registered under this name.
    #[error("scheduled job not found: {0}")]
    JobNotFound(String),

    /// A job callback returned an error. Logged, never propagated.
    #[error("callback for job '{job}' failed: {message}")]
    Callback { job: String, message: String },
}
