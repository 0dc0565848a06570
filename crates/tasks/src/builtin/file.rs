use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{display, io_error, parse_config};
use crate::{Context, ExecutableTask, TaskError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileOperation {
    #[default]
    Read,
    Write,
    Copy,
    Delete,
    List,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    operation: FileOperation,
    file_path: Option<String>,
    #[serde(default)]
    content: Value,
    destination: Option<String>,
}

/// Read, write, copy, delete, or list files.
pub struct FileTask {
    name: String,
    config: Value,
}

impl FileTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

#[async_trait]
impl ExecutableTask for FileTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: FileConfig = parse_config(&self.config, ctx)?;
        let path = config.file_path.ok_or_else(|| TaskError::missing("file_path"))?;
        debug!(task = %self.name, operation = ?config.operation, path = %path, "file operation");

        match config.operation {
            FileOperation::Read => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| io_error("read", &path, e))?;
                Ok(Value::String(content))
            }
            FileOperation::Write => {
                tokio::fs::write(&path, display(&config.content))
                    .await
                    .map_err(|e| io_error("write", &path, e))?;
                Ok(Value::String(format!("Written to {path}")))
            }
            FileOperation::Copy => {
                let destination = config
                    .destination
                    .ok_or_else(|| TaskError::missing("destination"))?;
                tokio::fs::copy(&path, &destination)
                    .await
                    .map_err(|e| io_error("copy", &path, e))?;
                Ok(Value::String(format!("Copied {path} to {destination}")))
            }
            FileOperation::Delete => {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| io_error("delete", &path, e))?;
                Ok(Value::String(format!("Deleted {path}")))
            }
            FileOperation::List => {
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| io_error("list", &path, e))?;
                if !metadata.is_dir() {
                    return Err(TaskError::execution(format!("{path} is not a directory")));
                }
                let mut entries = tokio::fs::read_dir(&path)
                    .await
                    .map_err(|e| io_error("list", &path, e))?;
                let mut files = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_error("list", &path, e))?
                {
                    files.push(entry.path().display().to_string());
                }
                files.sort();
                Ok(Value::from(files))
            }
        }
    }
}
