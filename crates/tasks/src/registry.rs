//! Tag-keyed lookup table of task kinds.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::builtin::{
    ConditionalTask, EmailTask, FileTask, HttpTask, LogTask, LoopTask, ShellTask, TransformTask,
    WaitTask,
};
use crate::{ExecutableTask, TaskError};

/// Builds a task kind from its task name and raw configuration.
pub type TaskFactory = Arc<dyn Fn(&str, Value) -> Arc<dyn ExecutableTask> + Send + Sync>;

/// Maps `type` strings (e.g. `"file"`) to task-kind factories.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with every built-in task kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("file", |name, config| Arc::new(FileTask::new(name, config)));
        registry.register("http", |name, config| Arc::new(HttpTask::new(name, config)));
        registry.register("shell", |name, config| Arc::new(ShellTask::new(name, config)));
        registry.register("conditional", |name, config| {
            Arc::new(ConditionalTask::new(name, config))
        });
        registry.register("loop", |name, config| Arc::new(LoopTask::new(name, config)));
        registry.register("wait", |name, config| Arc::new(WaitTask::new(name, config)));
        registry.register("log", |name, config| Arc::new(LogTask::new(name, config)));
        registry.register("email", |name, config| Arc::new(EmailTask::new(name, config)));
        registry.register("transform", |name, config| {
            Arc::new(TransformTask::new(name, config))
        });
        registry
    }

    /// Register (or replace) the factory for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&str, Value) -> Arc<dyn ExecutableTask> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Instantiate the task kind registered under `tag`.
    ///
    /// # Errors
    /// [`TaskError::Configuration`] when no kind is registered for `tag`.
    pub fn create(
        &self,
        tag: &str,
        name: &str,
        config: Value,
    ) -> Result<Arc<dyn ExecutableTask>, TaskError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| TaskError::configuration(format!("unknown task type: {tag}")))?;
        Ok(factory(name, config))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
