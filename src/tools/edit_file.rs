use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::fs;

use super::{required_str, resolve_in_sandbox, SideEffect, Tool, ToolContext, ToolKind, ToolResult};

/// Exact string replacement inside an existing sandbox file.
pub struct EditFileTool {
    sandbox_root: PathBuf,
}

impl EditFileTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Edit
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file within the sandbox. Fails if the string is missing, or ambiguous without replace_all."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file (relative to sandbox or absolute)"
                },
                "old_string": {
                    "type": "string",
                    "description": "Text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default: false)",
                    "default": false
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> Result<ToolResult> {
        let path = required_str(&params, "path")?;
        let old_string = required_str(&params, "old_string")?;
        let new_string = required_str(&params, "new_string")?;
        let replace_all = params["replace_all"].as_bool().unwrap_or(false);

        if old_string.is_empty() {
            bail!("old_string must not be empty");
        }

        let validated_path = resolve_in_sandbox(&self.sandbox_root, path)?;
        let original = fs::read_to_string(&validated_path).await?;

        let occurrences = original.matches(old_string).count();
        if occurrences == 0 {
            bail!("old_string not found in {}", path);
        }
        if occurrences > 1 && !replace_all {
            bail!(
                "old_string occurs {} times in {}; set replace_all to replace every occurrence",
                occurrences,
                path
            );
        }

        let updated = if replace_all {
            original.replace(old_string, new_string)
        } else {
            original.replacen(old_string, new_string, 1)
        };
        fs::write(&validated_path, &updated).await?;

        Ok(ToolResult {
            success: true,
            output: json!({
                "path": path,
                "replacements": occurrences,
            }),
            side_effects: vec![SideEffect::FileEdited {
                path: validated_path,
                replacements: occurrences,
            }],
        })
    }
}
