//! The `ExecutableTask` trait: the contract every task kind fulfils.

use async_trait::async_trait;
use serde_json::Value;

use crate::TaskError;

/// The mapping threaded through every task of one workflow run.
///
/// Task kinds only read it. The orchestrator is the only writer, and it
/// publishes each task's non-null result under `"<task name>_result"`.
pub type Context = serde_json::Map<String, Value>;

/// The core task trait.
///
/// Built-in kinds and custom plugins alike implement this. A kind carries
/// its own configuration; `execute` receives the live context and returns
/// the task's result (`Value::Null` means "no result").
#[async_trait]
pub trait ExecutableTask: Send + Sync {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError>;
}
