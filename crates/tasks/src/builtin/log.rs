use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use super::parse_config;
use crate::{Context, ExecutableTask, TaskError};

fn default_level() -> String {
    "info".into()
}

#[derive(Debug, Deserialize)]
struct LogConfig {
    #[serde(default)]
    message: String,
    #[serde(default = "default_level")]
    level: String,
}

/// Emit a rendered message through `tracing`.
///
/// Logging is output, not data: the task produces no result, so nothing is
/// published into the context.
pub struct LogTask {
    name: String,
    config: Value,
}

impl LogTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

#[async_trait]
impl ExecutableTask for LogTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let LogConfig { message, level } = parse_config(&self.config, ctx)?;
        let task = self.name.as_str();

        match level.to_ascii_lowercase().as_str() {
            "trace" => trace!(task, "{message}"),
            "debug" => debug!(task, "{message}"),
            "warn" | "warning" => warn!(task, "{message}"),
            "error" | "critical" => error!(task, "{message}"),
            _ => info!(task, "{message}"),
        }

        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn log_produces_no_result() {
        let task = LogTask::new("say", json!({ "message": "value is ${v}", "level": "WARNING" }));
        let ctx: Context = json!({ "v": 1 }).as_object().cloned().unwrap();
        assert_eq!(task.execute(&ctx).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn message_referencing_non_string_values_is_logged() {
        let ctx: Context = json!({ "count": 3, "fetch_result": { "status_code": 200 } })
            .as_object()
            .cloned()
            .unwrap();
        for message in ["${count}", "${fetch_result}", "${fetch_result.status_code}"] {
            let task = LogTask::new("say", json!({ "message": message }));
            assert_eq!(task.execute(&ctx).await.unwrap(), Value::Null, "{message}");
        }
    }

    #[tokio::test]
    async fn non_string_message_is_a_configuration_error() {
        let task = LogTask::new("say", json!({ "message": { "nested": true } }));
        assert!(matches!(
            task.execute(&Context::new()).await,
            Err(TaskError::Configuration(_))
        ));
    }
}
