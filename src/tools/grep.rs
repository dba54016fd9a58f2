use anyhow::{anyhow, Result};
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{required_str, Tool, ToolContext, ToolKind, ToolResult};

const DEFAULT_MAX_RESULTS: usize = 50;
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct GrepTool {
    sandbox_root: PathBuf,
}

#[derive(Debug, Clone)]
struct SearchMatch {
    file_path: String,
    line_number: usize,
    line_content: String,
}

impl GrepTool {
    pub fn new(sandbox_root: PathBuf) -> Self {
        Self { sandbox_root }
    }
}

fn search(
    root: &Path,
    regex: &regex::Regex,
    filter: Option<&GlobMatcher>,
    max_results: usize,
) -> Vec<SearchMatch> {
    let mut matches = Vec::new();

    let files = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in files {
        let relative = match entry.path().strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };

        if let Some(filter) = filter {
            if !filter.is_match(relative) {
                continue;
            }
        }

        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }

        // Binary or non-UTF-8 files are skipped.
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(_) => continue,
        };

        for (idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(SearchMatch {
                    file_path: relative.display().to_string(),
                    line_number: idx + 1,
                    line_content: line.to_string(),
                });
                if matches.len() >= max_results {
                    return matches;
                }
            }
        }
    }

    matches
}

#[async_trait]
impl Tool for GrepTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Grep
    }

    fn description(&self) -> &str {
        "Search sandbox files for a regex pattern. Returns matching lines with line numbers. Can filter by a glob such as '*.rs'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "glob": {
                    "type": "string",
                    "description": "Optional file filter (e.g., '*.rs', 'src/**/*.ts')"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case insensitive search (default: false)",
                    "default": false
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 50)",
                    "default": 50
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> Result<ToolResult> {
        let pattern = required_str(&params, "pattern")?;
        let case_insensitive = params["case_insensitive"].as_bool().unwrap_or(false);
        let max_results = params["max_results"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| anyhow!("Invalid pattern: {}", e))?;

        let filter = match params["glob"].as_str() {
            Some(g) => Some(
                Glob::new(g)
                    .map_err(|e| anyhow!("Invalid glob: {}", e))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let root = self.sandbox_root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            search(&root, &regex, filter.as_ref(), max_results)
        })
        .await?;

        let results: Vec<Value> = matches
            .iter()
            .map(|m| {
                json!({
                    "file": m.file_path,
                    "line": m.line_number,
                    "content": m.line_content,
                })
            })
            .collect();

        Ok(ToolResult {
            success: true,
            output: json!({
                "pattern": pattern,
                "count": results.len(),
                "matches": results,
            }),
            side_effects: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentId;
    use std::fs;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn context(temp_dir: &TempDir) -> ToolContext {
        ToolContext {
            agent_id: AgentId::new_v4(),
            agent_name: "advisor".to_string(),
            sandbox_root: temp_dir.path().to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("src")).unwrap();
        fs::write(
            temp_dir.path().join("src/cache.rs"),
            "struct Cache;\n// TODO evict\nfn get() {}\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.md"), "todo: write docs\n").unwrap();
        temp_dir
    }

    #[tokio::test]
    async fn test_grep_with_glob_filter() {
        let temp_dir = fixture();
        let tool = GrepTool::new(temp_dir.path().to_path_buf());

        let result = tool
            .execute(
                json!({"pattern": "todo", "case_insensitive": true, "glob": "**/*.rs"}),
                &context(&temp_dir),
            )
            .await
            .unwrap();

        assert_eq!(result.output["count"], 1);
        assert_eq!(result.output["matches"][0]["file"], "src/cache.rs");
        assert_eq!(result.output["matches"][0]["line"], 2);
    }

    #[tokio::test]
    async fn test_grep_max_results() {
        let temp_dir = fixture();
        let tool = GrepTool::new(temp_dir.path().to_path_buf());

        let result = tool
            .execute(
                json!({"pattern": "(?i)todo", "max_results": 1}),
                &context(&temp_dir),
            )
            .await
            .unwrap();

        assert_eq!(result.output["count"], 1);
    }

    #[tokio::test]
    async fn test_grep_invalid_pattern() {
        let temp_dir = fixture();
        let tool = GrepTool::new(temp_dir.path().to_path_buf());

        let result = tool
            .execute(json!({"pattern": "("}), &context(&temp_dir))
            .await;
        assert!(result.is_err());
    }
}
