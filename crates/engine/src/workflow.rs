//! The workflow orchestrator.
//!
//! A `Workflow` runs its tasks strictly in declaration order against one
//! shared context:
//! 1. A task whose `skip_conditions` match the context is marked `Skipped`.
//! 2. Otherwise the task runs; a non-null result is published into the
//!    context as `"<task name>_result"`.
//! 3. The first failure aborts the run. Later tasks stay `Pending`.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use tasks::Context;

use crate::task::{self, Task, TaskStatus};
use crate::EngineError;

/// Point-in-time view of one task inside a [`WorkflowSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
}

/// Point-in-time, read-only projection of a workflow and its tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Elapsed seconds of the last finished run.
    pub duration: Option<f64>,
    pub tasks: Vec<TaskSummary>,
    pub context: Context,
}

impl WorkflowSummary {
    /// The first failed task and its error message, if any.
    pub fn failed_task(&self) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Failed)
    }
}

/// An ordered task sequence plus the context it threads through them.
pub struct Workflow {
    name: String,
    tasks: Vec<Task>,
    context: Context,
    status: TaskStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    summary_tx: watch::Sender<WorkflowSummary>,
}

impl Workflow {
    /// Assemble a workflow. Task order is execution order.
    ///
    /// # Errors
    /// [`EngineError::DuplicateTaskName`] if two tasks share a name.
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Result<Self, EngineError> {
        let name = name.into();

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.name()) {
                return Err(EngineError::DuplicateTaskName {
                    workflow: name,
                    task: task.name().to_owned(),
                });
            }
        }

        let (summary_tx, _) = watch::channel(WorkflowSummary {
            name: name.clone(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: None,
            tasks: Vec::new(),
            context: Context::new(),
        });

        let workflow = Self {
            name,
            tasks,
            context: Context::new(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            duration: None,
            summary_tx,
        };
        workflow.publish();
        Ok(workflow)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    /// Context as of the last task that finished.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            name: self.name.clone(),
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration: self.duration.map(|d| d.as_secs_f64()),
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskSummary {
                    name: t.name().to_owned(),
                    status: t.status(),
                    error: t.error().map(str::to_owned),
                })
                .collect(),
            context: self.context.clone(),
        }
    }

    /// Observe summaries as they change, including while a run is in flight.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSummary> {
        self.summary_tx.subscribe()
    }

    /// Run every task in order, starting from `initial_context` (or empty).
    ///
    /// Each call starts over: context, statuses and timestamps of the
    /// previous run are discarded.
    ///
    /// # Errors
    /// The first task failure, unchanged. The workflow is then `Failed`.
    #[instrument(skip_all, fields(workflow = %self.name))]
    pub async fn run(&mut self, initial_context: Option<Context>) -> Result<Context, EngineError> {
        info!("starting workflow");
        self.context = initial_context.unwrap_or_default();
        self.tasks.iter_mut().for_each(Task::reset);
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.duration = None;
        self.publish();

        let clock = Instant::now();
        let outcome = self.run_tasks().await;

        self.finished_at = Some(Utc::now());
        self.duration = Some(clock.elapsed());
        match &outcome {
            Ok(()) => {
                self.status = TaskStatus::Success;
                info!("workflow completed successfully");
            }
            Err(e) => {
                self.status = TaskStatus::Failed;
                error!(error = %e, "workflow failed");
            }
        }
        info!("workflow took {:.2} seconds", clock.elapsed().as_secs_f64());
        self.publish();

        outcome.map(|()| self.context.clone())
    }

    async fn run_tasks(&mut self) -> Result<(), EngineError> {
        for index in 0..self.tasks.len() {
            if should_skip(self.tasks[index].config(), &self.context) {
                self.tasks[index].skip()?;
                info!(task = %self.tasks[index].name(), "skipping task");
                self.publish();
                continue;
            }

            let clock = self.tasks[index].start()?;
            self.publish();

            let kind = self.tasks[index].kind();
            let timeout = self.tasks[index].timeout();
            let outcome = task::execute(kind, timeout, &self.context).await;

            let finished = self.tasks[index].finish(clock, outcome);
            if let Ok(value) = &finished {
                if !value.is_null() {
                    let key = format!("{}_result", self.tasks[index].name());
                    self.context.insert(key, value.clone());
                }
            }
            self.publish();
            finished?;
        }
        Ok(())
    }

    fn publish(&self) {
        self.summary_tx.send_replace(self.summary());
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

/// True when any of the task's `skip_conditions` matches the context.
///
/// A condition is `{"context_key": K, "value": V}` and matches when the
/// context value under `K` equals `V` (a missing key compares as `null`).
pub fn should_skip(config: &Value, ctx: &Context) -> bool {
    config
        .get("skip_conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| conditions.iter().any(|c| condition_matches(c, ctx)))
}

fn condition_matches(condition: &Value, ctx: &Context) -> bool {
    match (
        condition.get("context_key").and_then(Value::as_str),
        condition.get("value"),
    ) {
        (Some(key), Some(expected)) => ctx.get(key).unwrap_or(&Value::Null) == expected,
        _ => false,
    }
}
