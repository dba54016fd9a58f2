pub mod builtin;
pub mod handler;
pub mod metrics;
pub mod spec;

pub use handler::{annotate_refinement, HandlerContext, TaskHandler};
pub use metrics::{AgentMetrics, ErrorRecord, MetricsSnapshot};
pub use spec::AgentSpec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, Result};
use crate::lifecycle::{AgentStateMachine, LifecycleEvent, RetryPolicy};
use crate::providers::Backend;
use crate::tools::{ToolBox, ToolKind};
use crate::types::{AgentId, AgentState, CapabilitySet, Role, Task, TaskOutput};
use crate::validation::{Stage, ValidationPipeline, ValidationResult};

/// Receives lifecycle notifications from an agent. Calls happen after the
/// agent's internal locks are released.
pub trait AgentObserver: Send + Sync {
    fn task_completed(&self, _agent: &Agent, _task: &Task, _duration: Duration) {}
    fn task_failed(&self, _agent: &Agent, _task: &Task, _error: &OrchestratorError) {}
    fn terminated(&self, _agent: &Agent) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    pub model: String,
    pub role: Role,
    pub specialization: Option<String>,
    pub state: AgentState,
    pub capabilities: CapabilitySet,
    pub tools: BTreeSet<ToolKind>,
    pub metrics: MetricsSnapshot,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

struct Runtime {
    state: AgentState,
    last_activity: DateTime<Utc>,
    metrics: AgentMetrics,
}

impl Runtime {
    fn apply(&mut self, event: LifecycleEvent) {
        if let Err(e) = AgentStateMachine::transition(&mut self.state, event) {
            log::debug!("ignored lifecycle event: {}", e);
        }
    }
}

pub struct Agent {
    id: AgentId,
    spec: AgentSpec,
    tools: ToolBox,
    handler: Arc<dyn TaskHandler>,
    backend: Arc<dyn Backend>,
    pipeline: Option<Arc<ValidationPipeline>>,
    observer: Option<Arc<dyn AgentObserver>>,
    runtime: Mutex<Runtime>,
    exec_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Agent {
    /// Validates the spec, resolves the effective capability set and tool
    /// allow-list, and moves the agent to `Ready`.
    pub fn new(
        mut spec: AgentSpec,
        handler: Arc<dyn TaskHandler>,
        backend: Arc<dyn Backend>,
        sandbox_root: PathBuf,
    ) -> Result<Self> {
        spec.validate()?;
        spec.capabilities = CapabilitySet::for_agent(spec.capabilities, spec.role, &spec.model);

        let tools = ToolBox::new(sandbox_root, &spec.tools, &spec.capabilities);
        let now = Utc::now();

        let mut runtime = Runtime {
            state: AgentState::Initialized,
            last_activity: now,
            metrics: AgentMetrics::new(),
        };
        AgentStateMachine::transition(&mut runtime.state, LifecycleEvent::Initialized)?;

        Ok(Self {
            id: AgentId::new_v4(),
            spec,
            tools,
            handler,
            backend,
            pipeline: None,
            observer: None,
            runtime: Mutex::new(runtime),
            exec_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            created_at: now,
        })
    }

    pub fn with_pipeline(mut self, pipeline: Arc<ValidationPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    pub fn model(&self) -> &str {
        &self.spec.model
    }

    pub fn role(&self) -> Role {
        self.spec.role
    }

    pub fn specialization(&self) -> Option<&str> {
        self.spec.specialization.as_deref()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.spec.capabilities
    }

    pub fn tools(&self) -> &ToolBox {
        &self.tools
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.spec.retry_policy
    }

    pub fn timeout(&self) -> Duration {
        self.spec.timeout()
    }

    pub fn task_types(&self) -> Vec<String> {
        self.handler.task_types()
    }

    pub fn handles(&self, task_type: &str) -> bool {
        self.handler.handles(task_type)
    }

    pub fn pipeline(&self) -> Option<&Arc<ValidationPipeline>> {
        self.pipeline.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        match self.runtime.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> AgentState {
        self.runtime().state
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.runtime().last_activity
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.runtime().metrics.snapshot()
    }

    pub fn status(&self) -> AgentStatus {
        let (state, last_activity, metrics) = {
            let rt = self.runtime();
            (rt.state, rt.last_activity, rt.metrics.snapshot())
        };

        AgentStatus {
            id: self.id,
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            model: self.spec.model.clone(),
            role: self.spec.role,
            specialization: self.spec.specialization.clone(),
            state,
            capabilities: self.spec.capabilities,
            tools: self.tools.allowed().clone(),
            metrics,
            created_at: self.created_at,
            last_activity,
        }
    }

    fn ensure_accepting(&self, state: AgentState) -> Result<()> {
        match state {
            AgentState::Terminated => Err(OrchestratorError::InvalidState(format!(
                "agent '{}' is terminated",
                self.spec.name
            ))),
            AgentState::Paused => Err(OrchestratorError::InvalidState(format!(
                "agent '{}' is paused",
                self.spec.name
            ))),
            _ => Ok(()),
        }
    }

    /// Runs a task through validation, the handler and refinement, retrying
    /// timeouts and transient backend failures per the retry policy.
    /// Executions on one agent are serialized.
    pub async fn execute(&self, mut task: Task) -> Result<TaskOutput> {
        self.ensure_accepting(self.state())?;
        if !self.handler.handles(&task.task_type) {
            return Err(OrchestratorError::UnknownTaskType {
                agent: self.spec.name.clone(),
                task_type: task.task_type,
            });
        }

        let _guard = self.exec_lock.lock().await;

        loop {
            let error = match self.attempt(&task).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            self.classify_failure();

            let retry = self.spec.retry_policy.should_retry(task.retry_count, &error)
                && self.state() != AgentState::Terminated;
            if !retry {
                return Err(error);
            }

            task.retry_count += 1;
            let delay = self.spec.retry_policy.delay_for(task.retry_count);
            log::warn!(
                "{}: task {} ({}) failed: {}; retry {}/{} in {:?}",
                self.spec.name,
                task.id,
                task.task_type,
                error,
                task.retry_count,
                self.spec.retry_policy.max_retries,
                delay
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => return Err(error),
            }
        }
    }

    async fn attempt(&self, task: &Task) -> Result<TaskOutput> {
        let cancel = self.begin()?;
        let started = Instant::now();

        let result = self.run(task, &cancel).await;

        self.finish(task, &result, started.elapsed());
        result
    }

    fn begin(&self) -> Result<CancellationToken> {
        let mut rt = self.runtime();
        self.ensure_accepting(rt.state)?;
        AgentStateMachine::transition(&mut rt.state, LifecycleEvent::TaskStarted)?;
        rt.last_activity = Utc::now();
        Ok(self.shutdown.child_token())
    }

    async fn run(&self, task: &Task, cancel: &CancellationToken) -> Result<TaskOutput> {
        let ctx = HandlerContext {
            agent_id: self.id,
            agent_name: &self.spec.name,
            model: &self.spec.model,
            role: self.spec.role,
            specialization: self.spec.specialization.as_deref(),
            max_tokens: self.spec.max_tokens,
            tools: &self.tools,
            backend: self.backend.as_ref(),
            cancel: cancel.clone(),
        };

        if let Some(pipeline) = self.enabled_pipeline(Stage::PreExecution) {
            self.runtime().metrics.record_validation();
            let data = json!({
                "task_type": task.task_type,
                "payload": task.payload,
                "requestor": task.requestor,
            });
            let result = pipeline
                .validate(Stage::PreExecution, self.id, &self.spec.name, data)
                .await
                .map_err(|e| OrchestratorError::PreconditionFailed(e.to_string()))?;
            if !result.passed {
                return Err(OrchestratorError::PreconditionFailed(summarize(&result)));
            }
            self.ensure_live(cancel)?;
        }

        let output = self.guarded(cancel, self.handler.handle(task, &ctx)).await?;

        if let Some(pipeline) = self.enabled_pipeline(Stage::PostExecution) {
            self.runtime().metrics.record_validation();
            let result = pipeline
                .validate(
                    Stage::PostExecution,
                    self.id,
                    &self.spec.name,
                    output.content.clone(),
                )
                .await
                .map_err(|e| OrchestratorError::ValidationFailed(e.to_string()))?;

            self.ensure_live(cancel)?;
            if result.requires_refinement {
                self.runtime().metrics.record_refinement();
                log::info!(
                    "{}: refining output of task {} ({} issues)",
                    self.spec.name,
                    task.id,
                    result.issues.len()
                );
                return self
                    .guarded(cancel, self.handler.refine(output, &result, &ctx))
                    .await
                    .map_err(|e| match e {
                        OrchestratorError::Timeout(_) | OrchestratorError::InvalidState(_) => e,
                        other => OrchestratorError::ValidationFailed(format!(
                            "refinement failed: {}",
                            other
                        )),
                    });
            }
        }

        Ok(output)
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(self.interrupted());
        }
        Ok(())
    }

    fn interrupted(&self) -> OrchestratorError {
        OrchestratorError::InvalidState(format!(
            "agent '{}' was terminated during execution",
            self.spec.name
        ))
    }

    fn enabled_pipeline(&self, stage: Stage) -> Option<&Arc<ValidationPipeline>> {
        self.pipeline.as_ref().filter(|p| p.is_enabled(stage))
    }

    /// Applies the agent timeout and terminate-cancellation to a handler call.
    async fn guarded<F>(&self, cancel: &CancellationToken, work: F) -> Result<TaskOutput>
    where
        F: Future<Output = Result<TaskOutput>>,
    {
        let limit = self.spec.timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.interrupted()),
            result = tokio::time::timeout(limit, work) => match result {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(OrchestratorError::Timeout(limit))
                }
            },
        }
    }

    fn finish(&self, task: &Task, result: &Result<TaskOutput>, elapsed: Duration) {
        {
            let mut rt = self.runtime();
            rt.last_activity = Utc::now();
            match result {
                Ok(output) => {
                    rt.metrics.record_success(elapsed, output.tokens_used);
                    if rt.state == AgentState::Executing {
                        rt.apply(LifecycleEvent::TaskSucceeded);
                    }
                }
                Err(error) => {
                    rt.metrics.record_failure(elapsed, task, error);
                    if rt.state == AgentState::Executing {
                        rt.apply(LifecycleEvent::TaskFailed);
                    }
                }
            }
        }

        match result {
            Ok(_) => {
                log::debug!(
                    "{}: task {} ({}) completed in {:?}",
                    self.spec.name,
                    task.id,
                    task.task_type,
                    elapsed
                );
                if let Some(observer) = &self.observer {
                    observer.task_completed(self, task, elapsed);
                }
            }
            Err(error) => {
                log::error!(
                    "{}: task {} ({}) failed after {:?}: {}",
                    self.spec.name,
                    task.id,
                    task.task_type,
                    elapsed,
                    error
                );
                if let Some(observer) = &self.observer {
                    observer.task_failed(self, task, error);
                }
            }
        }
    }

    fn classify_failure(&self) {
        let mut rt = self.runtime();
        if rt.state == AgentState::Error {
            rt.apply(LifecycleEvent::FailureClassified);
        }
    }

    pub fn pause(&self) -> Result<()> {
        let mut rt = self.runtime();
        AgentStateMachine::transition(&mut rt.state, LifecycleEvent::Paused)?;
        log::info!("{} ({}) paused", self.spec.name, self.id);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut rt = self.runtime();
        AgentStateMachine::transition(&mut rt.state, LifecycleEvent::Resumed)?;
        log::info!("{} ({}) resumed", self.spec.name, self.id);
        Ok(())
    }

    /// Cancels in-flight work and moves to `Terminated`. Returns false if the
    /// agent was already terminated.
    pub fn terminate(&self) -> bool {
        {
            let mut rt = self.runtime();
            if rt.state == AgentState::Terminated {
                return false;
            }
            rt.apply(LifecycleEvent::Terminated);
            rt.last_activity = Utc::now();
        }

        self.shutdown.cancel();
        log::info!("{} ({}) terminated", self.spec.name, self.id);

        if let Some(observer) = &self.observer {
            observer.terminated(self);
        }
        true
    }

    /// History of this agent's own validation requests.
    pub fn validation_history(&self) -> Vec<ValidationResult> {
        self.pipeline
            .as_ref()
            .map(|p| p.history())
            .unwrap_or_default()
    }
}

fn summarize(result: &ValidationResult) -> String {
    if result.issues.is_empty() {
        return format!(
            "rejected by {}",
            result.validator.as_deref().unwrap_or("validator")
        );
    }
    result
        .issues
        .iter()
        .map(|i| format!("{} ({}): {}", i.kind, i.severity, i.description))
        .collect::<Vec<_>>()
        .join("; ")
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.spec.name)
            .field("model", &self.spec.model)
            .field("role", &self.spec.role)
            .field("state", &self.state())
            .finish()
    }
}
