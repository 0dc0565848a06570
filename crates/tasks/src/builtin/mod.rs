//! Built-in task kinds.
//!
//! Each kind keeps its raw JSON configuration and only interprets it at
//! execution time, after `${...}` placeholders have been rendered against
//! the live context. A missing required field therefore fails the task
//! (not the workflow assembly).
//!
//! Rendering always produces strings. A kind that wants a referenced value
//! with its own JSON type (a number of seconds, a request body, an argv
//! list) names those fields in [`parse_typed_config`].

mod conditional;
mod email;
mod file;
mod http;
mod log;
mod loop_task;
mod shell;
mod transform;
mod wait;

pub use conditional::ConditionalTask;
pub use email::EmailTask;
pub use file::FileTask;
pub use http::HttpTask;
pub use log::LogTask;
pub use loop_task::LoopTask;
pub use shell::ShellTask;
pub use transform::TransformTask;
pub use wait::WaitTask;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{template, Context, TaskError};

/// Render `config` against `ctx` and deserialize it into a typed config.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value, ctx: &Context) -> Result<T, TaskError> {
    parse_typed_config(config, ctx, &[])
}

/// Like [`parse_config`], but a top-level field listed in `typed` whose
/// value is exactly one `${...}` reference takes the referenced value as-is.
pub(crate) fn parse_typed_config<T: DeserializeOwned>(
    config: &Value,
    ctx: &Context,
    typed: &[&str],
) -> Result<T, TaskError> {
    let rendered = match config {
        Value::Null => Value::Object(Default::default()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    let keep_type = typed.contains(&key.as_str())
                        && value.as_str().is_some_and(template::is_reference);
                    let value = if keep_type {
                        template::resolve_value(value, ctx)
                    } else {
                        template::render_value(value, ctx)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        other => template::render_value(other, ctx),
    };
    serde_json::from_value(rendered).map_err(|e| TaskError::configuration(e.to_string()))
}

/// Display form used when a JSON value is spliced into text.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn io_error(op: &str, path: &str, e: std::io::Error) -> TaskError {
    TaskError::execution(format!("{op} {path}: {e}"))
}

pub(crate) fn seconds(value: f64, field: &str) -> Result<std::time::Duration, TaskError> {
    std::time::Duration::try_from_secs_f64(value)
        .map_err(|_| TaskError::configuration(format!("{field} must be a non-negative number of seconds")))
}
