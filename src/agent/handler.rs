use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::providers::Backend;
use crate::tools::{ToolBox, ToolContext, ToolKind, ToolResult};
use crate::types::{AgentId, Refinement, Role, Task, TaskOutput};
use crate::validation::ValidationResult;

/// What a handler may touch while running one task.
pub struct HandlerContext<'a> {
    pub agent_id: AgentId,
    pub agent_name: &'a str,
    pub model: &'a str,
    pub role: Role,
    pub specialization: Option<&'a str>,
    pub max_tokens: u32,
    pub tools: &'a ToolBox,
    pub backend: &'a dyn Backend,
    pub cancel: CancellationToken,
}

impl HandlerContext<'_> {
    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            agent_id: self.agent_id,
            agent_name: self.agent_name.to_string(),
            sandbox_root: self.tools.sandbox_root().to_path_buf(),
            cancel: self.cancel.clone(),
        }
    }

    pub async fn invoke(&self, kind: ToolKind, params: Value) -> Result<ToolResult> {
        self.tools.invoke(kind, params, &self.tool_context()).await
    }
}

/// Role-specific task logic plugged into an [`Agent`](super::Agent).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_types(&self) -> Vec<String>;

    fn handles(&self, task_type: &str) -> bool {
        self.task_types().iter().any(|t| t == task_type)
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput>;

    async fn refine(
        &self,
        output: TaskOutput,
        feedback: &ValidationResult,
        _ctx: &HandlerContext<'_>,
    ) -> Result<TaskOutput> {
        Ok(annotate_refinement(output, feedback))
    }
}

/// Marks an output as refined and attaches the validator's feedback.
pub fn annotate_refinement(mut output: TaskOutput, feedback: &ValidationResult) -> TaskOutput {
    let lines = feedback.feedback();

    match &mut output.content {
        Value::Object(map) => {
            map.insert("refined".to_string(), Value::Bool(true));
            map.insert("feedback".to_string(), json!(lines));
        }
        other => {
            let original = other.take();
            *other = json!({
                "result": original,
                "refined": true,
                "feedback": lines,
            });
        }
    }

    output.refinement = Some(Refinement {
        feedback: lines,
        refined_at: Utc::now(),
    });
    output
}
