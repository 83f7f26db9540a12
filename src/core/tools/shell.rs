use super::traits::{
    ExecutionContextKind, InvocationContext, ParameterKind, ParameterSpec, Tool, ToolFuture,
    ToolMetadata, ToolResult, action_mentions,
};
use crate::security::WorkspaceSandbox;
use serde_json::{Map, Value, json};
use std::sync::Arc;

const SHELL_TIMEOUT_MS: u64 = 60_000;
/// Maximum output size in bytes (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;
const SHELL_ACTIONS: &[&str] = &["run", "command", "exec", "execute", "shell", "spawn"];
/// Only functional variables survive the cleared environment.
const SAFE_ENV_VARS: &[&str] = &["PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER"];

/// Runs allow-listed commands in the workspace with a cleared environment.
pub struct ShellTool {
    metadata: ToolMetadata,
    sandbox: Arc<WorkspaceSandbox>,
}

impl ShellTool {
    pub fn new(sandbox: Arc<WorkspaceSandbox>) -> Self {
        let metadata = ToolMetadata::new("shell", "Execute an allow-listed command in the workspace")
            .with_capabilities(["process_spawn", "execute", "command"])
            .with_permissions(["process_spawn"])
            .with_context(ExecutionContextKind::Local)
            .with_parameter(ParameterSpec::required(
                "command",
                ParameterKind::String,
                "The command line to run",
            ))
            .with_timeout_ms(SHELL_TIMEOUT_MS)
            .with_domain("system");

        Self { metadata, sandbox }
    }
}

fn truncate_output(mut text: String, label: &str) -> String {
    if text.len() > MAX_OUTPUT_BYTES {
        text.truncate(text.floor_char_boundary(MAX_OUTPUT_BYTES));
        text.push_str(&format!("\n... [{label} truncated at 1MB]"));
    }
    text
}

impl Tool for ShellTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    fn can_handle(&self, action: &str) -> bool {
        action_mentions(action, SHELL_ACTIONS)
    }

    fn execute<'a>(
        &'a self,
        parameters: Map<String, Value>,
        ctx: &'a InvocationContext,
    ) -> ToolFuture<'a> {
        Box::pin(async move {
            let command = parameters
                .get("command")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing 'command' parameter"))?;

            if !self.sandbox.is_command_allowed(command) {
                return Ok(ToolResult::fail("blocked by sandbox: command not allowed"));
            }

            tokio::fs::create_dir_all(&self.sandbox.workspace_dir).await?;

            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(command)
                .current_dir(&self.sandbox.workspace_dir)
                .env_clear()
                .kill_on_drop(true);
            for var in SAFE_ENV_VARS {
                if let Ok(value) = std::env::var(var) {
                    cmd.env(var, value);
                }
            }

            tracing::debug!(step_id = %ctx.step_id, command, "spawning shell command");

            let output = match cmd.output().await {
                Ok(output) => output,
                Err(e) => return Ok(ToolResult::fail(format!("Failed to execute command: {e}"))),
            };

            let stdout = truncate_output(String::from_utf8_lossy(&output.stdout).to_string(), "output");
            let stderr = truncate_output(String::from_utf8_lossy(&output.stderr).to_string(), "stderr");
            let data = json!({
                "stdout": stdout,
                "stderr": stderr,
                "exitCode": output.status.code(),
            });

            if output.status.success() {
                Ok(ToolResult::ok(data))
            } else {
                Ok(ToolResult {
                    success: false,
                    data,
                    error: Some(if stderr.trim().is_empty() {
                        format!("command exited with {}", output.status)
                    } else {
                        stderr.trim().to_string()
                    }),
                })
            }
        })
    }
}
