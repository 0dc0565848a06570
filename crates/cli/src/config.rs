//! The `autoflow` configuration file.
//!
//! ```json
//! {
//!   "logging":   { "level": "info" },
//!   "scheduler": { "check_interval_secs": 60 },
//!   "workflows": { "backup": { "tasks": [ ... ] } },
//!   "schedules": [ { "name": "nightly", "workflow": "backup", "schedule": "0 2 * * *" } ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use engine::{Workflow, WorkflowDefinition, WorkflowEngine};
use scheduler::{JobConfig, ScheduledJob, SchedulerConfig};
use serde::Deserialize;
use tasks::TaskRegistry;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `engine=debug`.
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub workflows: BTreeMap<String, WorkflowDefinition>,
    pub schedules: Vec<JobConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build every workflow and register it with a fresh engine.
    pub async fn build_engine(&self, registry: &TaskRegistry) -> anyhow::Result<Arc<WorkflowEngine>> {
        let engine = WorkflowEngine::new();
        for (name, definition) in &self.workflows {
            let workflow = Workflow::from_definition(name, definition, registry)
                .with_context(|| format!("invalid workflow '{name}'"))?;
            engine.register(workflow).await;
        }
        Ok(Arc::new(engine))
    }

    /// Build the scheduled jobs, checking each one targets a known workflow.
    pub fn build_jobs(&self) -> anyhow::Result<Vec<ScheduledJob>> {
        self.schedules
            .iter()
            .map(|job| {
                if !self.workflows.contains_key(&job.workflow) {
                    bail!(
                        "schedule '{}' refers to unknown workflow '{}'",
                        job.name,
                        job.workflow
                    );
                }
                ScheduledJob::from_config(job.clone())
                    .with_context(|| format!("invalid schedule '{}'", job.name))
            })
            .collect()
    }
}
