//! `MockTask` — a test double for `ExecutableTask`.
//!
//! Useful in unit and integration tests where a real task kind is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{template, Context, ExecutableTask, TaskError};

/// Behaviour injected into `MockTask` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Render a `${...}` template against the context and return the string.
    Render(String),
    /// Fail with the given error.
    Fail(TaskError),
}

/// A mock task that records every context it receives and returns a
/// programmer-specified result.
pub struct MockTask {
    /// Label used in test assertions.
    pub name: String,
    /// What the task will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// Optional pause before the behaviour is applied.
    pub delay: Option<Duration>,
    /// All contexts seen by this task (in call order).
    pub calls: Arc<Mutex<Vec<Context>>>,
}

impl MockTask {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that renders `template` against the context it is given.
    pub fn rendering(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Render(template.into()))
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: TaskError) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(error))
    }

    /// Sleep for `delay` before producing the outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this task has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The context seen by the most recent call, if any.
    pub fn last_context(&self) -> Option<Context> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExecutableTask for MockTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        self.calls.lock().unwrap().push(ctx.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::Render(t) => Ok(Value::String(template::render(t, ctx))),
            MockBehaviour::Fail(e) => Err(e.clone()),
        }
    }
}
