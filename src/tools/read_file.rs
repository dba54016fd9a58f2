use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::fs;

use super::{required_str, resolve_in_sandbox, Tool, ToolContext, ToolKind, ToolResult};

pub struct ReadFileTool {
    sandbox_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn description(&self) -> &str {
        "Read contents of a file within the sandbox. Optionally restrict to a line range."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file (relative to sandbox or absolute)"
                },
                "offset": {
                    "type": "integer",
                    "description": "First line to return, 1-based (default: 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> Result<ToolResult> {
        let path = required_str(&params, "path")?;
        let validated_path = resolve_in_sandbox(&self.sandbox_root, path)?;

        let raw = fs::read_to_string(&validated_path).await?;
        let size = raw.len();

        let offset = params["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let content = match params["limit"].as_u64() {
            Some(limit) => raw
                .lines()
                .skip(offset - 1)
                .take(limit as usize)
                .collect::<Vec<_>>()
                .join("\n"),
            None if offset > 1 => raw.lines().skip(offset - 1).collect::<Vec<_>>().join("\n"),
            None => raw,
        };

        Ok(ToolResult {
            success: true,
            output: json!({
                "path": path,
                "content": content,
                "size": size,
            }),
            side_effects: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn context(temp_dir: &TempDir) -> ToolContext {
        ToolContext {
            agent_id: AgentId::new_v4(),
            agent_name: "builder".to_string(),
            sandbox_root: temp_dir.path().to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_read_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test.txt"), "Hello, World!")
            .await
            .unwrap();

        let tool = ReadFileTool::new(temp_dir.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "test.txt"}), &context(&temp_dir))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output["content"], "Hello, World!");
        assert_eq!(result.output["size"], 13);
    }

    #[tokio::test]
    async fn test_read_line_range() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("lines.txt"), "one\ntwo\nthree\nfour")
            .await
            .unwrap();

        let tool = ReadFileTool::new(temp_dir.path().to_path_buf());
        let result = tool
            .execute(
                json!({"path": "lines.txt", "offset": 2, "limit": 2}),
                &context(&temp_dir),
            )
            .await
            .unwrap();

        assert_eq!(result.output["content"], "two\nthree");
    }

    #[tokio::test]
    async fn test_read_outside_sandbox() {
        let temp_dir = TempDir::new().unwrap();
        let tool = ReadFileTool::new(temp_dir.path().to_path_buf());

        let result = tool
            .execute(json!({"path": "../secret"}), &context(&temp_dir))
            .await;
        assert!(result.is_err());
    }
}
