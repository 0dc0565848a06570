//! Cron scheduler.
//!
//! A background loop wakes every `check_interval`, runs each enabled job
//! whose `next_run` has passed, advances the job and notifies callbacks.
//! Due jobs within one check run one after another, in name order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use engine::{Context, EngineError, WorkflowEngine};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::job::{JobStatus, ScheduledJob};

/// Observer notified after every scheduled run.
///
/// Exactly one of `result` and `error` is `Some`. Errors returned here are
/// logged and never stop the scheduler.
#[async_trait]
pub trait JobCallback: Send + Sync {
    async fn on_job_finished(
        &self,
        job: &JobStatus,
        result: Option<&Context>,
        error: Option<&EngineError>,
    ) -> anyhow::Result<()>;
}

struct Shared {
    engine: Arc<WorkflowEngine>,
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
    callbacks: RwLock<Vec<Arc<dyn JobCallback>>>,
    check_interval: Duration,
}

struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs registered workflows on cron schedules.
pub struct WorkflowScheduler {
    shared: Arc<Shared>,
    handle: Mutex<Option<LoopHandle>>,
}

impl WorkflowScheduler {
    pub fn new(engine: Arc<WorkflowEngine>, config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                jobs: Mutex::new(BTreeMap::new()),
                callbacks: RwLock::new(Vec::new()),
                check_interval: config.check_interval(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Add a job, replacing any job with the same name.
    pub async fn add_job(&self, job: ScheduledJob) {
        info!(
            job = %job.name(),
            workflow = %job.workflow(),
            schedule = %job.schedule(),
            next_run = %job.next_run(),
            "added scheduled job"
        );
        self.shared.jobs.lock().await.insert(job.name().to_owned(), job);
    }

    pub async fn remove_job(&self, name: &str) -> Result<ScheduledJob, SchedulerError> {
        let removed = self
            .shared
            .jobs
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_owned()))?;
        info!(job = %name, "removed scheduled job");
        Ok(removed)
    }

    pub async fn enable_job(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, true).await
    }

    pub async fn disable_job(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        let mut jobs = self.shared.jobs.lock().await;
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_owned()))?;
        job.set_enabled(enabled);
        info!(job = %name, enabled, "updated scheduled job");
        Ok(())
    }

    pub async fn add_callback(&self, callback: Arc<dyn JobCallback>) {
        self.shared.callbacks.write().await.push(callback);
    }

    /// Spawn the check loop. Calling this while running only logs a warning.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.task.is_finished()) {
            warn!("scheduler is already running");
            return;
        }

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(Arc::clone(&self.shared), rx));
        *handle = Some(LoopHandle { shutdown, task });
        info!(
            check_interval_secs = self.shared.check_interval.as_secs_f64(),
            "started workflow scheduler"
        );
    }

    /// Signal the loop and wait for it to exit. A job already executing
    /// finishes first; no further jobs start.
    pub async fn stop(&self) {
        let Some(LoopHandle { shutdown, task }) = self.handle.lock().await.take() else {
            debug!("scheduler is not running");
            return;
        };

        let _ = shutdown.send(true);
        if let Err(err) = task.await {
            error!(error = %err, "scheduler loop terminated abnormally");
        }
        info!("stopped workflow scheduler");
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Run every job that is due right now, without the background loop.
    /// Returns how many jobs ran.
    pub async fn run_pending(&self) -> usize {
        self.shared.run_pending(None).await
    }

    pub async fn get_job_status(&self) -> Vec<JobStatus> {
        self.shared
            .jobs
            .lock()
            .await
            .values()
            .map(ScheduledJob::status)
            .collect()
    }
}

impl Drop for WorkflowScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.shutdown.send(true);
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        let executed = shared.run_pending(Some(&shutdown)).await;
        if executed > 0 {
            debug!(executed, "scheduler check finished");
        }
    }

    debug!("scheduler loop exited");
}

impl Shared {
    async fn run_pending(&self, shutdown: Option<&watch::Receiver<bool>>) -> usize {
        let now = Utc::now();
        let due: Vec<String> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.should_run(now))
            .map(|job| job.name().to_owned())
            .collect();

        let mut executed = 0;
        for name in due {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!("stop requested, leaving remaining jobs for later");
                break;
            }
            if self.execute_job(&name).await {
                executed += 1;
            }
        }
        executed
    }

    #[instrument(skip_all, fields(job = %name))]
    async fn execute_job(&self, name: &str) -> bool {
        let (workflow, context, snapshot) = {
            let jobs = self.jobs.lock().await;
            let Some(job) = jobs.get(name) else {
                return false;
            };
            (job.workflow().to_owned(), job.context().clone(), job.status())
        };

        info!(workflow = %workflow, "executing scheduled job");
        let outcome = self.engine.run(&workflow, Some(context)).await;

        let status = {
            let mut jobs = self.jobs.lock().await;
            match jobs.get_mut(name) {
                Some(job) => {
                    job.mark_completed(Utc::now());
                    job.status()
                }
                None => {
                    warn!("job was removed while running");
                    snapshot
                }
            }
        };

        match &outcome {
            Ok(_) => info!(workflow = %workflow, next_run = ?status.next_run, "scheduled job completed"),
            Err(err) => error!(workflow = %workflow, error = %err, "scheduled job failed"),
        }

        let (result, error) = match &outcome {
            Ok(ctx) => (Some(ctx), None),
            Err(err) => (None, Some(err)),
        };
        self.notify(&status, result, error).await;
        true
    }

    async fn notify(&self, status: &JobStatus, result: Option<&Context>, error: Option<&EngineError>) {
        let callbacks = self.callbacks.read().await.clone();
        for callback in callbacks {
            if let Err(err) = callback.on_job_finished(status, result, error).await {
                let err = SchedulerError::Callback {
                    job: status.name.clone(),
                    message: format!("{err:#}"),
                };
                error!(error = %err, "job callback failed");
            }
        }
    }
}
