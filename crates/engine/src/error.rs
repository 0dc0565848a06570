//! Engine-level error types.

use thiserror::Error;

use crate::task::TaskStatus;
use tasks::TaskError;

/// Errors produced by the workflow engine (assembly + execution).
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    // ------ Lookup errors ------

    /// No workflow is registered under this name.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    // ------ Assembly errors ------

    /// Two tasks in the same workflow share a name.
    #[error("duplicate task name '{task}' in workflow '{workflow}'")]
    DuplicateTaskName { workflow: String, task: String },

    /// A workflow definition could not be turned into tasks.
    #[error("invalid workflow configuration: {0}")]
    Configuration(String),

    // ------ Execution errors ------

    /// A task was asked to run from a state other than `Pending`.
    #[error("task '{task}' cannot start from status {status}")]
    InvalidTransition { task: String, status: TaskStatus },

    /// A task failed; the enclosing workflow run is aborted.
    #[error("task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },
}

impl EngineError {
    /// The underlying task error, if this failure came from a task.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Task { source, .. } => Some(source),
            _ => None,
        }
    }
}
