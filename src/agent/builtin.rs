use async_trait::async_trait;
use serde_json::{json, Value};

use super::handler::{HandlerContext, TaskHandler};
use crate::error::{OrchestratorError, Result};
use crate::providers::Generation;
use crate::tools::ToolKind;
use crate::types::{ArtifactDraft, Task, TaskOutput};

/// Human-readable request text from a task payload.
fn describe(task: &Task) -> String {
    for key in ["description", "prompt", "requirements", "topic"] {
        if let Some(text) = task.payload.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    match &task.payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

async fn generate(ctx: &HandlerContext<'_>, system: &str, task: &Task) -> Result<Generation> {
    let prompt = format!(
        "{}\n\nTask type: {}\nRequested by: {}",
        describe(task),
        task.task_type,
        task.requestor.as_deref().unwrap_or("user")
    );
    ctx.backend
        .generate(
            ctx.model,
            &prompt,
            &json!({
                "system": system,
                "data": task.payload,
                "max_tokens": ctx.max_tokens,
            }),
        )
        .await
}

/// Writes the generated text when the payload names an `output_path`.
/// Denied writes surface as `PermissionDenied`.
async fn persist(ctx: &HandlerContext<'_>, task: &Task, text: &str, content: &mut Value) -> Result<()> {
    if let Some(path) = task.payload.get("output_path").and_then(Value::as_str) {
        let result = ctx
            .invoke(ToolKind::Write, json!({"path": path, "content": text}))
            .await?;
        content["written_to"] = json!(path);
        content["bytes"] = result.output["size"].clone();
    }
    Ok(())
}

fn types(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Generates text for a task and packages it as content plus artifact.
async fn produce(
    ctx: &HandlerContext<'_>,
    task: &Task,
    system: &str,
    field: &str,
    artifact_type: &str,
) -> Result<TaskOutput> {
    let generation = generate(ctx, system, task).await?;

    let mut content = json!({
        "task_type": task.task_type,
        "agent": ctx.agent_name,
    });
    content[field] = json!(generation.text);
    persist(ctx, task, &generation.text, &mut content).await?;

    Ok(TaskOutput::new(content.clone())
        .with_tokens(generation.tokens_used)
        .with_artifact(ArtifactDraft {
            artifact_type: artifact_type.to_string(),
            content,
            metadata: json!({ "model": ctx.model, "task_id": task.id }),
        }))
}

const ARCHITECT_TASKS: &[&str] = &[
    "design_system",
    "design_component",
    "review_architecture",
    "plan_migration",
    "design_api",
];

pub struct ArchitectHandler;

#[async_trait]
impl TaskHandler for ArchitectHandler {
    fn task_types(&self) -> Vec<String> {
        types(ARCHITECT_TASKS)
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        let artifact_type = match task.task_type.as_str() {
            "design_api" => "api_spec",
            "plan_migration" => "migration_plan",
            "review_architecture" => "architecture_review",
            _ => "design_document",
        };
        produce(
            ctx,
            task,
            "You are a software architect. Produce a concise, structured design with components, interfaces and trade-offs.",
            "design",
            artifact_type,
        )
        .await
    }
}

const BUILDER_TASKS: &[&str] = &[
    "implement_feature",
    "implement_component",
    "refactor_code",
    "fix_bug",
    "write_tests",
    "optimize_performance",
];

pub struct BuilderHandler;

#[async_trait]
impl TaskHandler for BuilderHandler {
    fn task_types(&self) -> Vec<String> {
        types(BUILDER_TASKS)
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        let artifact_type = if task.task_type == "write_tests" {
            "tests"
        } else {
            "code"
        };
        let mut output = produce(
            ctx,
            task,
            "You are a senior engineer. Return working code with brief notes on what changed.",
            "code",
            artifact_type,
        )
        .await?;
        Self::apply_edits(ctx, task, &mut output.content).await?;
        Self::verify(ctx, task, &mut output.content).await?;
        Ok(output)
    }
}

impl BuilderHandler {
    /// Applies payload `edits` (`path`, `old_string`, `new_string`) in order.
    async fn apply_edits(ctx: &HandlerContext<'_>, task: &Task, content: &mut Value) -> Result<()> {
        let Some(edits) = task.payload.get("edits").and_then(Value::as_array) else {
            return Ok(());
        };
        let mut edited = Vec::new();
        for edit in edits {
            let result = ctx.invoke(ToolKind::Edit, edit.clone()).await?;
            edited.push(result.output);
        }
        content["edits"] = json!(edited);
        Ok(())
    }

    /// Runs the payload `verify` command and records its outcome. A failing
    /// command is reported, not raised.
    async fn verify(ctx: &HandlerContext<'_>, task: &Task, content: &mut Value) -> Result<()> {
        let Some(command) = task.payload.get("verify").and_then(Value::as_str) else {
            return Ok(());
        };
        let result = ctx
            .invoke(ToolKind::Bash, json!({ "command": command }))
            .await?;
        content["verification"] = json!({
            "command": command,
            "passed": result.success,
            "exit_code": result.output["exit_code"],
            "stdout": result.output["stdout"],
        });
        Ok(())
    }
}

const DOCUMENTER_TASKS: &[&str] = &[
    "document_readme",
    "document_api",
    "document_guide",
    "document_architecture",
    "document_inline",
];

pub struct DocumenterHandler;

#[async_trait]
impl TaskHandler for DocumenterHandler {
    fn task_types(&self) -> Vec<String> {
        types(DOCUMENTER_TASKS)
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        produce(
            ctx,
            task,
            "You are a technical writer. Produce clear markdown documentation.",
            "documentation",
            "documentation",
        )
        .await
    }
}

const REVIEW_TASKS: &[&str] = &[
    "validate_pre_execution",
    "validate_post_execution",
    "validate_architecture",
    "validate_implementation",
    "validate_security",
    "validate_performance",
    "review_code",
    "suggest_improvements",
    "analyze_risks",
];

/// Read-only review used by advisor and validator roles. Output content is
/// a serialized [`Analysis`](crate::providers::Analysis).
pub struct ReviewHandler;

impl ReviewHandler {
    fn criteria(task: &Task) -> Vec<String> {
        if let Some(list) = task.payload.get("criteria").and_then(Value::as_array) {
            return list
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
        }
        match task.task_type.as_str() {
            "validate_security" => vec!["security".to_string()],
            "validate_performance" => vec!["performance".to_string()],
            _ => Vec::new(),
        }
    }

    /// What to review: a file at `path`, lines matching `search` (limited to
    /// `files` when given), every file matching `files`, or the payload.
    async fn subject(task: &Task, ctx: &HandlerContext<'_>) -> Result<Value> {
        let payload = &task.payload;
        if let Some(path) = payload.get("path").and_then(Value::as_str) {
            let result = ctx.invoke(ToolKind::Read, json!({ "path": path })).await?;
            return Ok(result.output["content"].clone());
        }
        if let Some(pattern) = payload.get("search").and_then(Value::as_str) {
            let mut params = json!({ "pattern": pattern });
            if let Some(files) = payload.get("files") {
                params["glob"] = files.clone();
            }
            let result = ctx.invoke(ToolKind::Grep, params).await?;
            let lines: Vec<String> = result.output["matches"]
                .as_array()
                .map(|matches| {
                    matches
                        .iter()
                        .map(|m| {
                            format!(
                                "{}:{}: {}",
                                m["file"].as_str().unwrap_or_default(),
                                m["line"],
                                m["content"].as_str().unwrap_or_default()
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok(json!(lines.join("\n")));
        }
        if let Some(pattern) = payload.get("files").and_then(Value::as_str) {
            let found = ctx.invoke(ToolKind::Glob, json!({ "pattern": pattern })).await?;
            let mut sources = serde_json::Map::new();
            for file in found.output["files"].as_array().into_iter().flatten() {
                if let Some(path) = file.as_str() {
                    let read = ctx.invoke(ToolKind::Read, json!({ "path": path })).await?;
                    sources.insert(path.to_string(), read.output["content"].clone());
                }
            }
            return Ok(Value::Object(sources));
        }
        Ok(payload
            .get("data")
            .cloned()
            .unwrap_or_else(|| payload.clone()))
    }
}

#[async_trait]
impl TaskHandler for ReviewHandler {
    fn task_types(&self) -> Vec<String> {
        types(REVIEW_TASKS)
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        let data = Self::subject(task, ctx).await?;
        let analysis = ctx
            .backend
            .analyze(ctx.model, &data, &Self::criteria(task))
            .await?;

        let content = serde_json::to_value(&analysis)
            .map_err(|e| OrchestratorError::Backend(format!("unserializable analysis: {}", e)))?;
        Ok(TaskOutput::new(content))
    }
}

/// Handler for declaratively defined agent types: a system prompt plus the
/// task types it accepts.
pub struct PromptHandler {
    task_types: Vec<String>,
    system_prompt: String,
    artifact_type: Option<String>,
}

impl PromptHandler {
    pub fn new(task_types: Vec<String>, system_prompt: String) -> Self {
        Self {
            task_types,
            system_prompt,
            artifact_type: None,
        }
    }

    pub fn with_artifact_type(mut self, artifact_type: Option<String>) -> Self {
        self.artifact_type = artifact_type;
        self
    }
}

#[async_trait]
impl TaskHandler for PromptHandler {
    fn task_types(&self) -> Vec<String> {
        self.task_types.clone()
    }

    async fn handle(&self, task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        match &self.artifact_type {
            Some(artifact_type) => {
                produce(ctx, task, &self.system_prompt, "result", artifact_type).await
            }
            None => {
                let generation = generate(ctx, &self.system_prompt, task).await?;
                let mut content = json!({
                    "task_type": task.task_type,
                    "agent": ctx.agent_name,
                    "result": generation.text,
                });
                persist(ctx, task, &generation.text, &mut content).await?;
                Ok(TaskOutput::new(content).with_tokens(generation.tokens_used))
            }
        }
    }
}
