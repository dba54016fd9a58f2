use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use super::{allowed_tools, Tool, ToolContext, ToolKind, ToolResult};
use crate::error::{OrchestratorError, Result};
use crate::types::CapabilitySet;

/// The per-agent tool runtime. Every invocation is checked against the
/// allow-list derived from the agent's capability set before any I/O.
pub struct ToolBox {
    tools: HashMap<ToolKind, Box<dyn Tool>>,
    allowed: BTreeSet<ToolKind>,
    sandbox_root: PathBuf,
}

impl ToolBox {
    pub fn new(sandbox_root: PathBuf, requested: &[ToolKind], capabilities: &CapabilitySet) -> Self {
        let mut tools: HashMap<ToolKind, Box<dyn Tool>> = HashMap::new();

        tools.insert(
            ToolKind::Read,
            Box::new(super::read_file::ReadFileTool::new(sandbox_root.clone())),
        );
        tools.insert(
            ToolKind::Write,
            Box::new(super::write_file::WriteFileTool::new(sandbox_root.clone())),
        );
        tools.insert(
            ToolKind::Edit,
            Box::new(super::edit_file::EditFileTool::new(sandbox_root.clone())),
        );
        tools.insert(
            ToolKind::Grep,
            Box::new(super::grep::GrepTool::new(sandbox_root.clone())),
        );
        tools.insert(
            ToolKind::Glob,
            Box::new(super::glob::GlobTool::new(sandbox_root.clone())),
        );
        tools.insert(
            ToolKind::Bash,
            Box::new(super::bash::BashTool::new(sandbox_root.clone())),
        );

        Self {
            tools,
            allowed: allowed_tools(requested, capabilities),
            sandbox_root,
        }
    }

    pub fn allowed(&self) -> &BTreeSet<ToolKind> {
        &self.allowed
    }

    pub fn is_allowed(&self, kind: ToolKind) -> bool {
        self.allowed.contains(&kind)
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn get_schemas(&self) -> Vec<Value> {
        self.allowed
            .iter()
            .filter_map(|kind| self.tools.get(kind))
            .map(|tool| {
                json!({
                    "name": tool.kind().as_str(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                })
            })
            .collect()
    }

    pub async fn invoke(
        &self,
        kind: ToolKind,
        params: Value,
        context: &ToolContext,
    ) -> Result<ToolResult> {
        if !self.is_allowed(kind) {
            log::warn!(
                "Denied tool {} for agent {} ({})",
                kind.as_str(),
                context.agent_name,
                context.agent_id
            );
            return Err(OrchestratorError::PermissionDenied {
                agent: context.agent_name.clone(),
                tool: kind.as_str().to_string(),
            });
        }

        let tool = self.tools.get(&kind).ok_or_else(|| OrchestratorError::Tool {
            tool: kind.as_str().to_string(),
            message: "tool is not installed".to_string(),
        })?;

        log::debug!("Agent {} invoking {}", context.agent_name, kind.as_str());

        tool.execute(params, context)
            .await
            .map_err(|e| OrchestratorError::Tool {
                tool: kind.as_str().to_string(),
                message: format!("{:#}", e),
            })
    }
}
