use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{required_str, resolve_in_sandbox, SideEffect, Tool, ToolContext, ToolKind, ToolResult};

/// Creates or replaces a sandboxed file. Requires file modification.
pub struct WriteFileTool {
    sandbox_root: PathBuf,
}

impl WriteFileTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }

    async fn append(target: &std::path::Path, content: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(target)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    fn description(&self) -> &str {
        "Create or replace a file under the agent sandbox, making missing directories. Set append to add to the end instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Sandbox-relative file path"},
                "content": {"type": "string", "description": "Text to store"},
                "append": {"type": "boolean", "default": false}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult> {
        let path = required_str(&params, "path")?;
        let content = required_str(&params, "content")?;
        let append = params
            .get("append")
            .and_then(Value::as_bool)
            .unwrap_or_default();

        let target = resolve_in_sandbox(&self.sandbox_root, path)?;
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).await?;
        }

        if append {
            Self::append(&target, content).await?;
        } else {
            fs::write(&target, content).await?;
        }

        let size = match fs::metadata(&target).await {
            Ok(meta) => meta.len(),
            Err(_) => content.len() as u64,
        };
        log::debug!(
            "{} {} {} ({} bytes)",
            context.agent_name,
            if append { "appended to" } else { "wrote" },
            path,
            size
        );

        Ok(ToolResult {
            success: true,
            output: json!({ "path": path, "size": size, "appended": append }),
            side_effects: vec![SideEffect::FileWritten(target)],
        })
    }
}
