use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{required_str, SideEffect, Tool, ToolContext, ToolKind, ToolResult};

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Runs a shell command with the sandbox as working directory.
pub struct BashTool {
    sandbox_root: PathBuf,
}

impl BashTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_OUTPUT_CHARS {
        let mut cut = MAX_OUTPUT_CHARS;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... (truncated)");
    }
    text
}

#[async_trait]
impl Tool for BashTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Bash
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the sandbox directory. The command is killed on timeout or cancellation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000, max: 600000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult> {
        let command = required_str(&params, "command")?;
        let timeout_ms = params["timeout_ms"]
            .as_u64()
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.sandbox_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow!("Failed to spawn shell: {}", e))?;

        let output = tokio::select! {
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()) => {
                match result {
                    Ok(output) => output?,
                    Err(_) => bail!("Command timed out after {}ms", timeout_ms),
                }
            }
            _ = context.cancel.cancelled() => bail!("Command cancelled"),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = truncate(String::from_utf8_lossy(&output.stdout).into_owned());
        let stderr = truncate(String::from_utf8_lossy(&output.stderr).into_owned());

        if exit_code != 0 {
            log::debug!(
                "{}: command exited with {}: {}",
                context.agent_name,
                exit_code,
                command
            );
        }

        Ok(ToolResult {
            success: output.status.success(),
            output: json!({
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": exit_code,
            }),
            side_effects: vec![SideEffect::CommandExecuted {
                command: command.to_string(),
                exit_code,
            }],
        })
    }
}
