//! Workflow registry and dispatcher.
//!
//! `WorkflowEngine` owns workflows by unique name and runs them:
//! - [`WorkflowEngine::run`] runs one workflow and propagates its failure.
//! - [`WorkflowEngine::run_all`] runs every workflow concurrently, each with
//!   its own copy of the initial context, and captures failures per workflow.
//!
//! Runs of the *same* workflow are serialized: each workflow sits behind an
//! async mutex, so a second run waits for the first to finish.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use tasks::Context;

use crate::workflow::{Workflow, WorkflowSummary};
use crate::EngineError;

/// Result of one workflow inside [`WorkflowEngine::run_all`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Success { result: Context },
    Failed { error: String },
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Success { .. } => None,
        }
    }
}

struct Registered {
    workflow: Arc<Mutex<Workflow>>,
    summary: watch::Receiver<WorkflowSummary>,
}

/// Registry of named workflows.
#[derive(Default)]
pub struct WorkflowEngine {
    workflows: RwLock<HashMap<String, Registered>>,
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow, replacing any workflow with the same name.
    pub async fn register(&self, workflow: Workflow) {
        let name = workflow.name().to_owned();
        let summary = workflow.subscribe();
        let entry = Registered {
            workflow: Arc::new(Mutex::new(workflow)),
            summary,
        };

        if self.workflows.write().await.insert(name.clone(), entry).is_some() {
            info!(workflow = %name, "replaced workflow");
        } else {
            info!(workflow = %name, "registered workflow");
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.workflows.read().await.contains_key(name)
    }

    /// Registered workflow names, sorted.
    pub async fn workflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Latest summary of a workflow. Readable while the workflow is running.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] for an unknown name.
    pub async fn summary(&self, name: &str) -> Result<WorkflowSummary, EngineError> {
        self.workflows
            .read()
            .await
            .get(name)
            .map(|r| r.summary.borrow().clone())
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_owned()))
    }

    /// Run one workflow and return its final context.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] for an unknown name; otherwise the
    /// workflow's own failure, unchanged.
    pub async fn run(&self, name: &str, context: Option<Context>) -> Result<Context, EngineError> {
        let handle = self
            .workflows
            .read()
            .await
            .get(name)
            .map(|r| r.workflow.clone())
            .ok_or_else(|| EngineError::WorkflowNotFound(name.to_owned()))?;

        run_serialized(name, &handle, context).await
    }

    /// Run every registered workflow concurrently.
    ///
    /// Never fails: each workflow's failure is captured in its outcome. A
    /// task failure is recorded with the task's own message.
    pub async fn run_all(&self, context: Option<Context>) -> BTreeMap<String, WorkflowOutcome> {
        let handles: Vec<(String, Arc<Mutex<Workflow>>)> = self
            .workflows
            .read()
            .await
            .iter()
            .map(|(name, r)| (name.clone(), r.workflow.clone()))
            .collect();

        info!(count = handles.len(), "running all workflows");

        let runs = handles.into_iter().map(|(name, handle)| {
            let context = context.clone();
            async move {
                let outcome = match run_serialized(&name, &handle, context).await {
                    Ok(result) => WorkflowOutcome::Success { result },
                    Err(e) => WorkflowOutcome::Failed {
                        error: e
                            .task_error()
                            .map_or_else(|| e.to_string(), |source| source.message().to_owned()),
                    },
                };
                (name, outcome)
            }
        });

        join_all(runs).await.into_iter().collect()
    }
}

async fn run_serialized(
    name: &str,
    handle: &Mutex<Workflow>,
    context: Option<Context>,
) -> Result<Context, EngineError> {
    let mut workflow = match handle.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            debug!(workflow = %name, "waiting for in-flight run to finish");
            handle.lock().await
        }
    };
    workflow.run(context).await
}
