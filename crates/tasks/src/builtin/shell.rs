use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use super::{parse_typed_config, seconds};
use crate::{Context, ExecutableTask, TaskError};

fn default_timeout() -> f64 {
    60.0
}

/// A shell line, or an argv list run without a shell.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct ShellConfig {
    command: Option<CommandSpec>,
    cwd: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default = "default_timeout")]
    timeout: f64,
}

/// Run a command and capture its exit code and output.
///
/// A non-zero exit status is reported in the result, not as a failure.
pub struct ShellTask {
    name: String,
    config: Value,
}

impl ShellTask {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        Self { name: name.into(), config }
    }
}

fn shell() -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C");
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c");
        cmd
    }
}

fn build_command(spec: CommandSpec) -> Result<Command, TaskError> {
    match spec {
        CommandSpec::Line(line) if line.trim().is_empty() => Err(TaskError::missing("command")),
        CommandSpec::Line(line) => {
            let mut cmd = shell();
            cmd.arg(line);
            Ok(cmd)
        }
        CommandSpec::Argv(argv) => {
            let (program, args) = argv.split_first().ok_or_else(|| TaskError::missing("command"))?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok(cmd)
        }
    }
}

#[async_trait]
impl ExecutableTask for ShellTask {
    async fn execute(&self, ctx: &Context) -> Result<Value, TaskError> {
        let config: ShellConfig = parse_typed_config(&self.config, ctx, &["command", "timeout"])?;
        let spec = config.command.ok_or_else(|| TaskError::missing("command"))?;
        let limit = seconds(config.timeout, "timeout")?;

        let mut cmd = build_command(spec)?;
        cmd.envs(&config.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        debug!(task = %self.name, "spawning command");
        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(output) => output
                .map_err(|e| TaskError::execution(format!("failed to run command: {e}")))?,
            Err(_) => {
                return Err(TaskError::Timeout(format!(
                    "command timed out after {} seconds",
                    config.timeout
                )))
            }
        };

        Ok(json!({
            "returncode": output.status.code(),
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "success": output.status.success(),
        }))
    }
}
