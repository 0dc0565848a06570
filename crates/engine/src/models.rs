//! Serializable workflow definitions.
//!
//! These types are what a configuration file describes; they are turned
//! into runnable [`Workflow`]s against a [`TaskRegistry`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tasks::TaskRegistry;

use crate::{EngineError, Task, Workflow};

/// A single step of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Registry tag of the task kind (e.g. `"file"`).
    #[serde(rename = "type")]
    pub task_type: String,
    /// Unique within the workflow; results are published as `<name>_result`.
    pub name: String,
    /// Kind-specific settings, plus the optional `skip_conditions` list.
    #[serde(default)]
    pub config: Value,
    /// Optional deadline for the task, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

/// A complete workflow definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl Workflow {
    /// Build a workflow from its definition.
    ///
    /// # Errors
    /// - [`EngineError::Configuration`] for an unknown task type or an
    ///   invalid timeout.
    /// - [`EngineError::DuplicateTaskName`] if two tasks share a name.
    pub fn from_definition(
        name: impl Into<String>,
        definition: &WorkflowDefinition,
        registry: &TaskRegistry,
    ) -> Result<Self, EngineError> {
        let tasks = definition
            .tasks
            .iter()
            .map(|def| build_task(def, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Workflow::new(name, tasks)
    }
}

fn build_task(def: &TaskDefinition, registry: &TaskRegistry) -> Result<Task, EngineError> {
    let kind = registry
        .create(&def.task_type, &def.name, def.config.clone())
        .map_err(|e| EngineError::Configuration(format!("task '{}': {e}", def.name)))?;

    let task = Task::new(def.name.clone(), def.config.clone(), kind);
    match def.timeout_secs {
        None => Ok(task),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(|limit| task.with_timeout(limit))
            .map_err(|_| {
                EngineError::Configuration(format!(
                    "task '{}': timeout_secs must be a non-negative number",
                    def.name
                ))
            }),
    }
}
