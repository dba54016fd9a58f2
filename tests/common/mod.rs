#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pantheon::agent::{HandlerContext, TaskHandler};
use pantheon::config::RegistryConfig;
use pantheon::providers::LocalBackend;
use pantheon::registry::AgentTemplate;
use pantheon::validation::{ValidationConfig, ValidationResult};
use pantheon::{AgentSpec, OrchestratorError, Registry, Result, Role, Task, TaskOutput};

/// Fails the first `failures` calls with the configured error, then returns
/// `content`.
pub struct FlakyHandler {
    task_types: Vec<String>,
    failures: u32,
    error: fn() -> OrchestratorError,
    content: Value,
    pub calls: Arc<AtomicU32>,
}

impl FlakyHandler {
    pub fn new(task_type: &str, failures: u32, error: fn() -> OrchestratorError) -> Self {
        Self {
            task_types: vec![task_type.to_string()],
            failures,
            error,
            content: json!({"result": "done"}),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn succeeding(task_type: &str, content: Value) -> Self {
        Self {
            content,
            ..Self::new(task_type, 0, || OrchestratorError::Backend("unused".into()))
        }
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    fn task_types(&self) -> Vec<String> {
        self.task_types.clone()
    }

    async fn handle(&self, _task: &Task, _ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err((self.error)());
        }
        Ok(TaskOutput::new(self.content.clone()))
    }
}

/// Sleeps far longer than any agent timeout and remembers the cancellation
/// token it was given.
pub struct SlowHandler {
    pub delay: Duration,
    pub token: Arc<Mutex<Option<CancellationToken>>>,
    pub calls: Arc<AtomicU32>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            token: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl TaskHandler for SlowHandler {
    fn task_types(&self) -> Vec<String> {
        vec!["long_analysis".to_string()]
    }

    async fn handle(&self, _task: &Task, ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = Some(ctx.cancel.clone());
        tokio::time::sleep(self.delay).await;
        Ok(TaskOutput::new(json!("finished")))
    }
}

pub fn spec(name: &str, role: Role) -> AgentSpec {
    AgentSpec::new(name, format!("{} for tests", name), "claude-3-haiku-20240307", role)
}

pub fn registry(root: &Path) -> Registry {
    registry_with(root, RegistryConfig::default(), ValidationConfig::default())
}

pub fn registry_with(root: &Path, config: RegistryConfig, validation: ValidationConfig) -> Registry {
    let registry = Registry::new(
        config,
        validation,
        Arc::new(LocalBackend::new()),
        root.to_path_buf(),
    );
    registry.register_builtin_types().unwrap();
    registry
}

pub fn register(registry: &Registry, spec: AgentSpec, handler: Arc<dyn TaskHandler>) {
    let name = spec.name.clone();
    registry
        .register_agent_type(&name, Arc::new(AgentTemplate::new(spec, handler)))
        .unwrap();
}

/// Review agent that waits `delay`, approves pre-execution requests and
/// answers post-execution requests with `post_reply`.
pub struct ScriptedValidator {
    pub delay: Duration,
    pub post_reply: Value,
}

#[async_trait]
impl TaskHandler for ScriptedValidator {
    fn task_types(&self) -> Vec<String> {
        vec![
            "validate_pre_execution".to_string(),
            "validate_post_execution".to_string(),
        ]
    }

    async fn handle(&self, task: &Task, _ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        tokio::time::sleep(self.delay).await;
        if task.task_type == "validate_post_execution" {
            return Ok(TaskOutput::new(self.post_reply.clone()));
        }
        Ok(TaskOutput::new(json!({"issues": []})))
    }
}

/// Produces output that fails review and cannot repair it.
pub struct StubbornHandler {
    pub calls: Arc<AtomicU32>,
    pub refinements: Arc<AtomicU32>,
}

impl StubbornHandler {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            refinements: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl TaskHandler for StubbornHandler {
    fn task_types(&self) -> Vec<String> {
        vec!["write_config".to_string()]
    }

    async fn handle(&self, _task: &Task, _ctx: &HandlerContext<'_>) -> Result<TaskOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TaskOutput::new(json!({"config": "token = 'abc'"})))
    }

    async fn refine(
        &self,
        _output: TaskOutput,
        _feedback: &ValidationResult,
        _ctx: &HandlerContext<'_>,
    ) -> Result<TaskOutput> {
        self.refinements.fetch_add(1, Ordering::SeqCst);
        Err(OrchestratorError::Backend("model refused to rewrite".into()))
    }
}

/// Registry without builtin types.
pub fn bare_registry(root: &Path) -> Registry {
    Registry::new(
        RegistryConfig::default(),
        ValidationConfig::default(),
        Arc::new(LocalBackend::new()),
        root.to_path_buf(),
    )
}
