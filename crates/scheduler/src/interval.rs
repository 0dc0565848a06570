//! Fixed-interval repetition of workflows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use engine::{Context, WorkflowEngine};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::SchedulerError;

/// Repeats workflows every N seconds, one background task per workflow.
///
/// Failures are logged and the repeater keeps going. Dropping the
/// scheduler aborts every repeater.
pub struct IntervalScheduler {
    engine: Arc<WorkflowEngine>,
    repeaters: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            repeaters: Mutex::new(HashMap::new()),
        }
    }

    /// Start repeating `workflow`. An existing repeater for the same
    /// workflow is replaced. With `run_immediately` false the first run
    /// happens after one interval.
    pub async fn schedule_workflow(
        &self,
        workflow: &str,
        every: Duration,
        context: Option<Context>,
        run_immediately: bool,
    ) -> Result<(), SchedulerError> {
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let task = tokio::spawn(repeat(
            Arc::clone(&self.engine),
            workflow.to_owned(),
            every,
            context,
            run_immediately,
        ));

        if let Some(previous) = self.repeaters.lock().await.insert(workflow.to_owned(), task) {
            previous.abort();
            info!(workflow, "replaced interval schedule");
        }
        info!(workflow, every_secs = every.as_secs_f64(), "scheduled workflow at fixed interval");
        Ok(())
    }

    /// Stop repeating `workflow`. Returns whether a repeater existed.
    pub async fn cancel(&self, workflow: &str) -> bool {
        match self.repeaters.lock().await.remove(workflow) {
            Some(task) => {
                task.abort();
                info!(workflow, "cancelled interval schedule");
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        for (workflow, task) in self.repeaters.lock().await.drain() {
            task.abort();
            info!(workflow = %workflow, "cancelled interval schedule");
        }
    }

    /// Names of workflows with a live repeater, sorted.
    pub async fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .repeaters
            .lock()
            .await
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for (_, task) in self.repeaters.get_mut().drain() {
            task.abort();
        }
    }
}

async fn repeat(
    engine: Arc<WorkflowEngine>,
    workflow: String,
    every: Duration,
    context: Option<Context>,
    run_immediately: bool,
) {
    if !run_immediately {
        tokio::time::sleep(every).await;
    }

    loop {
        info!(workflow = %workflow, "running workflow on interval");
        if let Err(err) = engine.run(&workflow, context.clone()).await {
            error!(workflow = %workflow, error = %err, "interval run failed");
        }
        tokio::time::sleep(every).await;
    }
}
