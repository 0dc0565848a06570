use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{parse_typed_config, seconds};
use crate::{Context, ExecutableTask, TaskError};

fn default_duration() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct WaitConfig {
    #[serde(default = "default_duration")]
    duration: f64,
}

/// Pause the workflow for `duration` seconds.
pub struct WaitTask {
    name: String,
    config: Value,
}

impl WaitTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

#[async_trait]
impl ExecutableTask for WaitTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: WaitConfig = parse_typed_config(&self.config, ctx, &["duration"])?;
        let pause = seconds(config.duration, "duration")?;
        debug!(task = %self.name, seconds = config.duration, "waiting");
        tokio::time::sleep(pause).await;
        Ok(Value::String(format!("Waited for {} seconds", config.duration)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn waits_for_configured_duration() {
        let task = WaitTask::new("pause", json!({ "duration": 5 }));
        let started = tokio::time::Instant::now();
        let out = task.execute(&Context::new()).await.unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_secs(5));
        assert_eq!(out, json!("Waited for 5 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn duration_from_context_reference() {
        let task = WaitTask::new("pause", json!({ "duration": "${delay}" }));
        let ctx: Context = json!({ "delay": 2.5 }).as_object().cloned().unwrap();
        let started = tokio::time::Instant::now();
        let out = task.execute(&ctx).await.unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(2500));
        assert_eq!(out, json!("Waited for 2.5 seconds"));
    }

    #[tokio::test]
    async fn negative_duration_is_rejected() {
        let task = WaitTask::new("pause", json!({ "duration": -1 }));
        assert!(matches!(
            task.execute(&Context::new()).await,
            Err(TaskError::Configuration(_))
        ));
    }
}
