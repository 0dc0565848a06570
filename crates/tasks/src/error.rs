//! Task-level error type.

use thiserror::Error;

/// Errors returned by a task's `execute` method.
///
/// Every variant aborts the enclosing workflow run; the variant only tells
/// the caller *why* the task gave up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Missing or invalid task configuration (e.g. an absent required field).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The task's underlying operation failed.
    #[error("execution error: {0}")]
    Execution(String),

    /// The task exceeded an explicit deadline.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl TaskError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// The task's own message, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(msg) | Self::Execution(msg) | Self::Timeout(msg) => msg,
        }
    }

    /// Shorthand for the common "`field` is required" configuration error.
    pub fn missing(field: &str) -> Self {
        Self::Configuration(format!("{field} is required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_drops_the_variant_prefix() {
        let err = TaskError::execution("upstream returned 503");
        assert_eq!(err.to_string(), "execution error: upstream returned 503");
        assert_eq!(err.message(), "upstream returned 503");
        assert_eq!(TaskError::missing("url").message(), "url is required");
    }
}
