pub mod bash;
pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod read_file;
pub mod runtime;
pub mod write_file;

pub use runtime::ToolBox;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::types::{AgentId, CapabilitySet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    Grep,
    Glob,
    Bash,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Read => "read",
            ToolKind::Write => "write",
            ToolKind::Edit => "edit",
            ToolKind::Grep => "grep",
            ToolKind::Glob => "glob",
            ToolKind::Bash => "bash",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Some(ToolKind::Read),
            "write" => Some(ToolKind::Write),
            "edit" | "multi_edit" => Some(ToolKind::Edit),
            "grep" => Some(ToolKind::Grep),
            "glob" => Some(ToolKind::Glob),
            "bash" => Some(ToolKind::Bash),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            ToolKind::Read,
            ToolKind::Write,
            ToolKind::Edit,
            ToolKind::Grep,
            ToolKind::Glob,
            ToolKind::Bash,
        ]
    }

    pub fn read_only() -> Vec<Self> {
        vec![ToolKind::Read, ToolKind::Grep, ToolKind::Glob]
    }
}

/// Intersects the requested tools with what the capability set permits.
pub fn allowed_tools(requested: &[ToolKind], capabilities: &CapabilitySet) -> BTreeSet<ToolKind> {
    let mut allowed: BTreeSet<ToolKind> = requested.iter().copied().collect();

    if !capabilities.content_generation().is_allowed()
        || !capabilities.file_modification().is_allowed()
    {
        allowed.remove(&ToolKind::Write);
        allowed.remove(&ToolKind::Edit);
    }

    if !capabilities.command_execution().is_allowed() {
        allowed.remove(&ToolKind::Bash);
    }

    allowed
}

pub struct ToolContext {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub sandbox_root: PathBuf,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    pub side_effects: Vec<SideEffect>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    FileWritten(PathBuf),
    FileEdited { path: PathBuf, replacements: usize },
    CommandExecuted { command: String, exit_code: i32 },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult>;
}

/// Resolves `path` inside `root`, rejecting anything that could climb out.
pub fn resolve_in_sandbox(root: &Path, path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);

    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(anyhow!("Path escapes sandbox: {}", path));
    }

    let full_path = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    if !full_path.starts_with(root) {
        return Err(anyhow!("Path escapes sandbox: {}", path));
    }

    Ok(full_path)
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params[key]
        .as_str()
        .ok_or_else(|| anyhow!("Missing {} parameter", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Permission;

    #[test]
    fn test_read_only_caps_strip_mutating_tools() {
        let allowed = allowed_tools(&ToolKind::all(), &CapabilitySet::read_only());
        assert_eq!(
            allowed.into_iter().collect::<Vec<_>>(),
            vec![ToolKind::Read, ToolKind::Grep, ToolKind::Glob]
        );
    }

    #[test]
    fn test_file_modification_forbidden() {
        let caps = CapabilitySet::new(Permission::Allowed, Permission::Forbidden, Permission::Allowed);
        let allowed = allowed_tools(&ToolKind::all(), &caps);
        assert!(!allowed.contains(&ToolKind::Write));
        assert!(!allowed.contains(&ToolKind::Edit));
        assert!(allowed.contains(&ToolKind::Bash));
    }

    #[test]
    fn test_never_grants_unrequested_tools() {
        let allowed = allowed_tools(&[ToolKind::Read], &CapabilitySet::all_allowed());
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn test_sandbox_resolution() {
        let root = Path::new("/tmp/sandbox");
        assert_eq!(
            resolve_in_sandbox(root, "notes/a.md").unwrap(),
            PathBuf::from("/tmp/sandbox/notes/a.md")
        );
        assert!(resolve_in_sandbox(root, "../escape.txt").is_err());
        assert!(resolve_in_sandbox(root, "/etc/passwd").is_err());
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(ToolKind::from_name("multi_edit"), Some(ToolKind::Edit));
        assert_eq!(ToolKind::from_name("Bash"), Some(ToolKind::Bash));
        assert_eq!(ToolKind::from_name("fetch"), None);
    }
}
