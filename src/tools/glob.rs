use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{required_str, Tool, ToolContext, ToolKind, ToolResult};

const DEFAULT_LIMIT: usize = 1000;

pub struct GlobTool {
    sandbox_root: PathBuf,
}

impl GlobTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }
}

fn find_matching_files(root: &Path, matcher: &GlobMatcher, limit: usize) -> Vec<String> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .filter(|relative| matcher.is_match(relative))
                .map(|relative| relative.display().to_string())
        })
        .take(limit)
        .collect()
}

#[async_trait]
impl Tool for GlobTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Glob
    }

    fn description(&self) -> &str {
        "Find sandbox files matching a glob pattern such as '**/*.rs'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match files (e.g., '**/*.ts', 'src/**/*.rs')"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default: 1000)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> Result<ToolResult> {
        let pattern = required_str(&params, "pattern")?.trim();
        if pattern.is_empty() {
            bail!("pattern must not be empty");
        }
        let limit = params["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let matcher = Glob::new(pattern)
            .map_err(|e| anyhow!("Invalid glob pattern: {}", e))?
            .compile_matcher();

        let root = self.sandbox_root.clone();
        let files =
            tokio::task::spawn_blocking(move || find_matching_files(&root, &matcher, limit))
                .await?;

        Ok(ToolResult {
            success: true,
            output: json!({
                "pattern": pattern,
                "count": files.len(),
                "files": files,
            }),
            side_effects: vec![],
        })
    }
}
