//! The task runner: one unit of work plus its lifecycle bookkeeping.
//!
//! ```text
//! Pending ──run──▶ Running ──▶ Success
//!    │                   └───▶ Failed
//!    └──skip──▶ Skipped
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use tasks::{Context, ExecutableTask, TaskError};

use crate::EngineError;

/// Lifecycle status shared by tasks and workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, configured task kind together with the state of its last run.
pub struct Task {
    name: String,
    config: Value,
    kind: Arc<dyn ExecutableTask>,
    timeout: Option<Duration>,
    status: TaskStatus,
    result: Option<Value>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Task {
    /// Wrap a task kind. `config` is the task's own settings; the workflow
    /// reads `skip_conditions` from it.
    pub fn new(name: impl Into<String>, config: Value, kind: Arc<dyn ExecutableTask>) -> Self {
        Self {
            name: name.into(),
            config,
            kind,
            timeout: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            duration: None,
        }
    }

    /// Fail the task with [`TaskError::Timeout`] if `execute` runs longer
    /// than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// The value returned by the last successful run.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The failure message of the last failed run.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Execute the task against `ctx`.
    ///
    /// On success the result is stored and returned; on failure the message
    /// is stored and the error is propagated. Timestamps are recorded either
    /// way.
    ///
    /// # Errors
    /// [`EngineError::InvalidTransition`] if the task is not `Pending`, or
    /// [`EngineError::Task`] wrapping whatever the task kind failed with.
    pub async fn run(&mut self, ctx: &Context) -> Result<Value, EngineError> {
        let clock = self.start()?;
        let outcome = execute(self.kind.clone(), self.timeout, ctx).await;
        self.finish(clock, outcome)
    }

    /// Mark the task `Skipped`. Only valid before it has started.
    pub(crate) fn skip(&mut self) -> Result<(), EngineError> {
        self.ensure_pending()?;
        self.status = TaskStatus::Skipped;
        Ok(())
    }

    /// Forget the previous run so the task can run again.
    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.result = None;
        self.error = None;
        self.started_at = None;
        self.finished_at = None;
        self.duration = None;
    }

    pub(crate) fn kind(&self) -> Arc<dyn ExecutableTask> {
        self.kind.clone()
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn ensure_pending(&self) -> Result<(), EngineError> {
        if self.status == TaskStatus::Pending {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                task: self.name.clone(),
                status: self.status,
            })
        }
    }

    /// `Pending → Running`. Returns the monotonic clock used for the duration.
    pub(crate) fn start(&mut self) -> Result<Instant, EngineError> {
        self.ensure_pending()?;
        info!(task = %self.name, "starting task");
        self.started_at = Some(Utc::now());
        self.status = TaskStatus::Running;
        Ok(Instant::now())
    }

    /// `Running → Success | Failed`.
    pub(crate) fn finish(
        &mut self,
        clock: Instant,
        outcome: Result<Value, TaskError>,
    ) -> Result<Value, EngineError> {
        let elapsed = clock.elapsed();
        self.finished_at = Some(Utc::now());
        self.duration = Some(elapsed);

        let result = match outcome {
            Ok(value) => {
                self.result = Some(value.clone());
                self.status = TaskStatus::Success;
                info!(task = %self.name, "task completed successfully");
                Ok(value)
            }
            Err(source) => {
                self.error = Some(source.to_string());
                self.status = TaskStatus::Failed;
                error!(task = %self.name, error = %source, "task failed");
                Err(EngineError::Task {
                    task: self.name.clone(),
                    source,
                })
            }
        };

        info!(task = %self.name, "task took {:.2} seconds", elapsed.as_secs_f64());
        result
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("timeout", &self.timeout)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Run a task kind, enforcing the optional deadline.
pub(crate) async fn execute(
    kind: Arc<dyn ExecutableTask>,
    timeout: Option<Duration>,
    ctx: &Context,
) -> Result<Value, TaskError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, kind.execute(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TaskError::Timeout(format!(
                "task exceeded its {:.2}s deadline",
                limit.as_secs_f64()
            ))),
        },
        None => kind.execute(ctx).await,
    }
}
