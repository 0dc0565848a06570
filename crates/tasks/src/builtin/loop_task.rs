use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{template, Context, ExecutableTask, TaskError, TaskRegistry};

/// Run one built-in task per item of a list.
///
/// Each iteration gets its own copy of the context extended with
/// `loop_item` and `loop_index`, so iterations never observe each other.
/// The inner task's config is rendered per iteration, which lets it refer
/// to `${loop_item}`.
pub struct LoopTask {
    name: String,
    config: Value,
}

impl LoopTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }

    fn items(&self, ctx: &Context) -> Result<Vec<Value>, TaskError> {
        let items = match self.config.get("items") {
            Some(v @ Value::String(_)) => template::resolve_value(v, ctx),
            Some(other) => template::render_value(other, ctx),
            None => Value::Null,
        };
        match items {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(TaskError::configuration(format!(
                "items must be an array, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl ExecutableTask for LoopTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let items = self.items(ctx)?;
        let task_config = self.config.get("task").cloned().unwrap_or_else(|| json!({}));
        let tag = task_config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::missing("task.type"))?
            .to_owned();

        let registry = TaskRegistry::with_builtins();
        if !registry.contains(&tag) {
            return Err(TaskError::configuration(format!("unknown task type: {tag}")));
        }
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let mut loop_ctx = ctx.clone();
            loop_ctx.insert("loop_item".into(), item);
            loop_ctx.insert("loop_index".into(), Value::from(index));

            let name = format!("{}_item_{index}", self.name);
            let task = registry.create(&tag, &name, task_config.clone())?;
            debug!(task = %name, "running loop iteration");
            results.push(task.execute(&loop_ctx).await?);
        }

        Ok(Value::Array(results))
    }
}
