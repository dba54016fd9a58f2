pub mod definitions;
pub mod stats;

pub use definitions::{builtin_types, load_definitions, AgentDefinition, AgentFactory, AgentTemplate};
pub use stats::{AgentHealth, HealthReport, RegistryStatistics};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::agent::{Agent, AgentObserver, AgentSpec};
use crate::config::{Config, RegistryConfig};
use crate::error::{OrchestratorError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::lifecycle::RetryPolicy;
use crate::providers::{Analysis, Backend};
use crate::tools::ToolKind;
use crate::types::{AgentId, AgentState, CapabilitySet, Permission, Role, Task, TaskOutput};
use crate::validation::{
    ValidationConfig, ValidationPipeline, ValidationRequest, ValidationRouter, ValidatorReport,
};

/// Per-instance adjustments applied on top of a type's blueprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOverrides {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub capabilities: Option<CapabilitySet>,
    #[serde(default)]
    pub tools: Option<Vec<ToolKind>>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl AgentOverrides {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    fn apply(self, mut spec: AgentSpec) -> AgentSpec {
        if let Some(description) = self.description {
            spec.description = description;
        }
        if let Some(model) = self.model {
            spec.model = model;
        }
        if let Some(specialization) = self.specialization {
            spec.specialization = Some(specialization);
        }
        if let Some(capabilities) = self.capabilities {
            spec.capabilities = capabilities;
        }
        if let Some(tools) = self.tools {
            spec.tools = tools;
        }
        if let Some(retry_policy) = self.retry_policy {
            spec.retry_policy = retry_policy;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            spec.timeout_ms = timeout_ms;
        }
        spec
    }
}

#[derive(Default)]
struct Index {
    agents: HashMap<AgentId, Arc<Agent>>,
    by_type: HashMap<String, HashSet<AgentId>>,
    by_model: HashMap<String, HashSet<AgentId>>,
    by_role: HashMap<Role, HashSet<AgentId>>,
}

impl Index {
    fn insert(&mut self, agent: Arc<Agent>) {
        let id = agent.id();
        self.by_type
            .entry(agent.name().to_string())
            .or_default()
            .insert(id);
        self.by_model
            .entry(agent.model().to_string())
            .or_default()
            .insert(id);
        self.by_role.entry(agent.role()).or_default().insert(id);
        self.agents.insert(id, agent);
    }

    fn remove(&mut self, id: AgentId) -> Option<Arc<Agent>> {
        let agent = self.agents.remove(&id)?;
        remove_from(&mut self.by_type, agent.name(), id);
        remove_from(&mut self.by_model, agent.model(), id);
        if let Some(ids) = self.by_role.get_mut(&agent.role()) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_role.remove(&agent.role());
            }
        }
        Some(agent)
    }

    fn count_of_type(&self, type_name: &str) -> usize {
        self.by_type.get(type_name).map_or(0, HashSet::len)
    }

    fn collect<'a>(&self, ids: impl IntoIterator<Item = &'a AgentId>) -> Vec<Arc<Agent>> {
        let mut agents: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect();
        agents.sort_by_key(|a| (a.created_at(), a.id()));
        agents
    }
}

fn remove_from(map: &mut HashMap<String, HashSet<AgentId>>, key: &str, id: AgentId) {
    if let Some(ids) = map.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            map.remove(key);
        }
    }
}

#[derive(Default)]
struct Counters {
    created: AtomicU64,
    tasks: AtomicU64,
    errors: AtomicU64,
    validations: AtomicU64,
}

#[derive(Default)]
struct SessionTotals {
    completed: u64,
    average_duration_ms: f64,
}

struct Shared {
    config: RegistryConfig,
    validation: ValidationConfig,
    sandbox_root: PathBuf,
    backend: Arc<dyn Backend>,
    types: RwLock<BTreeMap<String, Arc<dyn AgentFactory>>>,
    index: RwLock<Index>,
    counters: Counters,
    sessions: Mutex<SessionTotals>,
    events: EventBus,
}

impl Shared {
    fn unregister(&self, id: AgentId) -> Option<Arc<Agent>> {
        let removed = write(&self.index).remove(id);
        if let Some(agent) = &removed {
            log::debug!("Unregistered {} ({})", agent.name(), id);
        }
        removed
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Broad intent of a task type, judged by its leading verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskClass {
    Producing,
    Reviewing,
    Specialized,
}

const PRODUCING_VERBS: &[&str] = &[
    "create", "implement", "design", "write", "generate", "document", "build", "refactor", "fix",
    "optimize", "plan",
];
const REVIEWING_VERBS: &[&str] = &["validate", "review", "analyze", "audit", "suggest"];

impl TaskClass {
    fn of(task_type: &str) -> Self {
        let verb = task_type
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if PRODUCING_VERBS.contains(&verb.as_str()) {
            TaskClass::Producing
        } else if REVIEWING_VERBS.contains(&verb.as_str()) {
            TaskClass::Reviewing
        } else {
            TaskClass::Specialized
        }
    }

    fn admits(&self, agent: &Agent, task_type: &str) -> bool {
        match self {
            TaskClass::Producing => agent.capabilities().content_generation().is_allowed(),
            TaskClass::Reviewing => {
                agent.capabilities().content_generation() == Permission::Forbidden
            }
            TaskClass::Specialized => {
                agent.handles(task_type)
                    || agent
                        .specialization()
                        .is_some_and(|s| task_type.to_ascii_lowercase().contains(&s.to_ascii_lowercase()))
            }
        }
    }
}

/// Ready agents first, then the longest idle.
fn sort_by_availability(agents: &mut [Arc<Agent>]) {
    agents.sort_by_cached_key(|a| (a.state() != AgentState::Ready, a.last_activity(), a.id()));
}

/// Owns every live agent and the set of agent types that can be created.
/// Cloning shares the same registry.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    pub fn new(
        config: RegistryConfig,
        validation: ValidationConfig,
        backend: Arc<dyn Backend>,
        sandbox_root: PathBuf,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                validation,
                sandbox_root,
                backend,
                types: RwLock::new(BTreeMap::new()),
                index: RwLock::new(Index::default()),
                counters: Counters::default(),
                sessions: Mutex::new(SessionTotals::default()),
                events,
            }),
        }
    }

    /// Registry with the built-in types plus any definitions found in the
    /// configured directory.
    pub fn from_config(config: &Config, backend: Arc<dyn Backend>) -> Result<Self> {
        let registry = Self::new(
            config.registry.clone(),
            config.validation.clone(),
            backend,
            config.sandbox_root.clone(),
        );
        registry.register_builtin_types()?;
        if let Some(dir) = &config.registry.definitions_dir {
            let loaded = registry.load_definitions(dir)?;
            log::info!("Loaded {} agent definitions from {}", loaded, dir.display());
        }
        Ok(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn register_agent_type(&self, name: &str, factory: Arc<dyn AgentFactory>) -> Result<()> {
        let mut blueprint = factory.blueprint();
        blueprint.name = name.to_string();
        blueprint.validate()?;

        let mut types = write(&self.shared.types);
        if types.contains_key(name) {
            return Err(OrchestratorError::DuplicateType(name.to_string()));
        }
        types.insert(name.to_string(), factory);
        log::debug!("Registered agent type '{}'", name);
        Ok(())
    }

    pub fn register_builtin_types(&self) -> Result<()> {
        for (name, factory) in builtin_types() {
            self.register_agent_type(name, factory)?;
        }
        Ok(())
    }

    /// Registers every definition in `dir`. Returns how many were added.
    pub fn load_definitions(&self, dir: &Path) -> Result<usize> {
        let definitions = load_definitions(dir)?;
        let count = definitions.len();
        for definition in definitions {
            let name = definition.spec.name.clone();
            self.register_agent_type(&name, Arc::new(definition))?;
        }
        Ok(count)
    }

    pub fn agent_types(&self) -> Vec<String> {
        read(&self.shared.types).keys().cloned().collect()
    }

    pub fn has_type(&self, name: &str) -> bool {
        read(&self.shared.types).contains_key(name)
    }

    /// Blueprint of a registered type, with the registered name applied.
    pub fn blueprint(&self, type_name: &str) -> Option<AgentSpec> {
        read(&self.shared.types).get(type_name).map(|factory| {
            let mut spec = factory.blueprint();
            spec.name = type_name.to_string();
            spec
        })
    }

    /// Creates and registers an agent. The capacity checks and the insert
    /// happen under one lock so concurrent creations cannot overshoot.
    pub fn create_agent(&self, type_name: &str, overrides: AgentOverrides) -> Result<Arc<Agent>> {
        let agent = {
            let mut index = write(&self.shared.index);

            let max_total = self.shared.config.max_total_agents;
            if index.agents.len() >= max_total {
                return Err(OrchestratorError::CapacityExceeded(format!(
                    "registry holds {} agents (max {})",
                    index.agents.len(),
                    max_total
                )));
            }

            let factory = read(&self.shared.types)
                .get(type_name)
                .cloned()
                .ok_or_else(|| OrchestratorError::UnknownType(type_name.to_string()))?;

            let max_per_type = self.shared.config.max_agents_per_type;
            let of_type = index.count_of_type(type_name);
            if of_type >= max_per_type {
                return Err(OrchestratorError::CapacityExceeded(format!(
                    "{} '{}' agents exist (max {} per type)",
                    of_type, type_name, max_per_type
                )));
            }

            let agent = Arc::new(self.build(type_name, factory.as_ref(), overrides)?);
            index.insert(agent.clone());
            agent
        };

        self.shared.counters.created.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Created {} ({}) model={} role={}",
            agent.name(),
            agent.id(),
            agent.model(),
            agent.role().as_str()
        );
        self.shared.events.publish(DomainEvent::AgentCreated {
            agent_id: agent.id(),
            name: agent.name().to_string(),
            model: agent.model().to_string(),
        });

        Ok(agent)
    }

    fn build(
        &self,
        type_name: &str,
        factory: &dyn AgentFactory,
        overrides: AgentOverrides,
    ) -> Result<Agent> {
        let mut spec = overrides.apply(factory.blueprint());
        spec.name = type_name.to_string();

        let mut agent = Agent::new(
            spec,
            factory.handler(),
            self.shared.backend.clone(),
            self.shared.sandbox_root.clone(),
        )?;

        if !agent.role().is_validator_class() {
            let router = Arc::new(RegistryRouter {
                shared: Arc::downgrade(&self.shared),
            });
            let pipeline = ValidationPipeline::new(self.shared.validation.clone(), router)
                .with_events(self.shared.events.clone());
            agent = agent.with_pipeline(Arc::new(pipeline));
        }

        Ok(agent.with_observer(Arc::new(RegistryObserver {
            shared: Arc::downgrade(&self.shared),
        })))
    }

    pub fn get_agent(&self, id: AgentId) -> Option<Arc<Agent>> {
        read(&self.shared.index).agents.get(&id).cloned()
    }

    /// Most available live agent created from the named type.
    pub fn get_agent_by_name(&self, name: &str) -> Option<Arc<Agent>> {
        let mut agents = {
            let index = read(&self.shared.index);
            match index.by_type.get(name) {
                Some(ids) => index.collect(ids),
                None => return None,
            }
        };
        agents.retain(|a| !matches!(a.state(), AgentState::Terminated | AgentState::Paused));
        sort_by_availability(&mut agents);
        agents.into_iter().next()
    }

    pub fn get_agents_by_model(&self, model: &str) -> Vec<Arc<Agent>> {
        let index = read(&self.shared.index);
        index
            .by_model
            .get(model)
            .map(|ids| index.collect(ids))
            .unwrap_or_default()
    }

    pub fn get_agents_by_role(&self, role: Role) -> Vec<Arc<Agent>> {
        let index = read(&self.shared.index);
        index
            .by_role
            .get(&role)
            .map(|ids| index.collect(ids))
            .unwrap_or_default()
    }

    pub fn agents(&self) -> Vec<Arc<Agent>> {
        let index = read(&self.shared.index);
        index.collect(index.agents.keys())
    }

    pub fn len(&self) -> usize {
        read(&self.shared.index).agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live agents suitable for `task_type`, most available first.
    ///
    /// Producing tasks (`implement_*`, `design_*`, ...) need content
    /// generation. Reviewing tasks (`validate_*`, `review_*`, ...) go to
    /// agents without it. Anything else matches on handled task types or
    /// specialization.
    pub fn get_agents_for_task(&self, task_type: &str) -> Vec<Arc<Agent>> {
        let class = TaskClass::of(task_type);
        let mut candidates: Vec<_> = self
            .agents()
            .into_iter()
            .filter(|a| a.state() != AgentState::Terminated && class.admits(a, task_type))
            .collect();
        sort_by_availability(&mut candidates);
        candidates
    }

    /// Runs a task on the agent identified by id or type name, creating an
    /// agent of that type when none exists yet.
    pub async fn execute(&self, target: &str, task: Task) -> Result<TaskOutput> {
        let agent = self.resolve(target)?;
        agent.execute(task).await
    }

    fn resolve(&self, target: &str) -> Result<Arc<Agent>> {
        if let Ok(id) = Uuid::parse_str(target) {
            return self
                .get_agent(id)
                .ok_or_else(|| OrchestratorError::AgentNotFound(target.to_string()));
        }
        if let Some(agent) = self.get_agent_by_name(target) {
            return Ok(agent);
        }
        if self.has_type(target) {
            return self.create_agent(target, AgentOverrides::default());
        }
        Err(OrchestratorError::AgentNotFound(target.to_string()))
    }

    /// Finds a read-only validator other than `requestor`: an existing
    /// agent of the preferred type, then a freshly created one (subject to
    /// the registry caps), then any live advisor.
    pub fn find_validator(&self, preferred: &str, requestor: AgentId) -> Option<Arc<Agent>> {
        let eligible = |agent: &Arc<Agent>| {
            agent.id() != requestor
                && agent.role().is_validator_class()
                && agent.capabilities().is_read_only()
                && !matches!(agent.state(), AgentState::Terminated | AgentState::Paused)
        };

        let mut existing = {
            let index = read(&self.shared.index);
            index
                .by_type
                .get(preferred)
                .map(|ids| index.collect(ids))
                .unwrap_or_default()
        };
        existing.retain(|a| eligible(a));
        sort_by_availability(&mut existing);
        if let Some(agent) = existing.into_iter().next() {
            return Some(agent);
        }

        let creatable = self
            .blueprint(preferred)
            .is_some_and(|spec| spec.role.is_validator_class());
        if creatable {
            match self.create_agent(preferred, AgentOverrides::default()) {
                Ok(agent) if eligible(&agent) => return Some(agent),
                Ok(_) => {}
                Err(e) => log::debug!("Cannot create validator '{}': {}", preferred, e),
            }
        }

        let mut fallback: Vec<_> = self
            .get_agents_by_role(Role::Advisor)
            .into_iter()
            .filter(|a| eligible(a))
            .collect();
        sort_by_availability(&mut fallback);
        fallback.into_iter().next()
    }

    /// Terminates and unregisters an agent.
    pub fn terminate_agent(&self, id: AgentId) -> Result<()> {
        let agent = self
            .get_agent(id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(id.to_string()))?;
        agent.terminate();
        self.shared.unregister(id);
        Ok(())
    }

    /// Terminates every registered agent. Returns how many were removed.
    pub fn terminate_all(&self) -> usize {
        let agents = self.agents();
        for agent in &agents {
            agent.terminate();
            self.shared.unregister(agent.id());
        }
        if !agents.is_empty() {
            log::info!("Terminated {} agents", agents.len());
        }
        agents.len()
    }

    pub fn record_session_duration(&self, duration: Duration) {
        let mut sessions = self
            .shared
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sessions.completed += 1;
        let ms = duration.as_secs_f64() * 1000.0;
        sessions.average_duration_ms += (ms - sessions.average_duration_ms) / sessions.completed as f64;
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let (completed, average) = {
            let sessions = self
                .shared
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            (sessions.completed, sessions.average_duration_ms)
        };
        let counters = &self.shared.counters;
        let agents = self.agents();

        let mut stats = RegistryStatistics {
            total_agents_created: counters.created.load(Ordering::Relaxed),
            active_agents: agents.len(),
            max_total_agents: self.shared.config.max_total_agents,
            total_tasks_executed: counters.tasks.load(Ordering::Relaxed),
            total_errors: counters.errors.load(Ordering::Relaxed),
            total_validations: counters.validations.load(Ordering::Relaxed),
            sessions_completed: completed,
            average_session_duration_ms: average,
            registered_types: self.agent_types(),
            ..RegistryStatistics::default()
        };
        for agent in &agents {
            stats.tally(agent);
        }
        stats
    }

    pub fn health_check(&self) -> HealthReport {
        let report = HealthReport::build(&self.agents(), self.shared.config.max_total_agents);
        if !report.healthy {
            log::warn!("Registry health check: {}", report.issues.join("; "));
        }
        report
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("agents", &self.len())
            .field("types", &self.agent_types())
            .finish()
    }
}

/// Routes validation requests from an agent's pipeline to a validator
/// owned by the same registry.
struct RegistryRouter {
    shared: Weak<Shared>,
}

#[async_trait]
impl ValidationRouter for RegistryRouter {
    async fn route(&self, request: &ValidationRequest) -> Result<Option<ValidatorReport>> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(None);
        };
        let registry = Registry { shared };

        let Some(validator) =
            registry.find_validator(&request.preferred_validator, request.requestor_id)
        else {
            return Ok(None);
        };

        registry
            .shared
            .counters
            .validations
            .fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "{} validation of {} routed to {} ({})",
            request.stage.as_str(),
            request.requestor,
            validator.name(),
            validator.id()
        );

        let task = Task::new(
            request.stage.task_type(),
            json!({
                "data": request.data,
                "stage": request.stage.as_str(),
                "requestor": request.requestor,
            }),
        )
        .with_requestor(request.requestor.clone());

        let output = validator.execute(task).await?;
        let analysis: Analysis = serde_json::from_value(output.content).map_err(|e| {
            OrchestratorError::Backend(format!(
                "validator '{}' returned an unreadable analysis: {}",
                validator.name(),
                e
            ))
        })?;

        Ok(Some(ValidatorReport {
            validator: validator.name().to_string(),
            analysis,
        }))
    }
}

/// Keeps registry counters and the index in step with agent lifecycles.
struct RegistryObserver {
    shared: Weak<Shared>,
}

impl AgentObserver for RegistryObserver {
    fn task_completed(&self, agent: &Agent, task: &Task, duration: Duration) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.counters.tasks.fetch_add(1, Ordering::Relaxed);
        shared.events.publish(DomainEvent::TaskCompleted {
            agent_id: agent.id(),
            task_id: task.id,
            task_type: task.task_type.clone(),
            duration_ms: duration.as_millis() as u64,
        });
    }

    fn task_failed(&self, agent: &Agent, task: &Task, error: &OrchestratorError) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.counters.tasks.fetch_add(1, Ordering::Relaxed);
        shared.counters.errors.fetch_add(1, Ordering::Relaxed);
        shared.events.publish(DomainEvent::AgentError {
            agent_id: agent.id(),
            task_id: task.id,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn terminated(&self, agent: &Agent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.unregister(agent.id());
        shared.events.publish(DomainEvent::AgentTerminated {
            agent_id: agent.id(),
            name: agent.name().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalBackend;
    use tempfile::TempDir;

    fn registry(temp_dir: &TempDir) -> Registry {
        let registry = Registry::new(
            RegistryConfig::default(),
            ValidationConfig::default(),
            Arc::new(LocalBackend::new()),
            temp_dir.path().to_path_buf(),
        );
        registry.register_builtin_types().unwrap();
        registry
    }

    #[test]
    fn test_duplicate_type() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let (_, factory) = builtin_types().remove(0);

        let err = registry.register_agent_type("architect", factory).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateType(name) if name == "architect"));
    }

    #[test]
    fn test_unknown_type() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let err = registry
            .create_agent("necromancer", AgentOverrides::default())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownType(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_indexes_follow_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let builder = registry
            .create_agent("builder", AgentOverrides::default())
            .unwrap();
        let advisor = registry
            .create_agent("advisor", AgentOverrides::default())
            .unwrap();

        assert_eq!(registry.get_agents_by_role(Role::Advisor).len(), 1);
        assert_eq!(registry.get_agents_by_model("gemini-1.5-pro").len(), 1);
        assert_eq!(
            registry.get_agent_by_name("builder").unwrap().id(),
            builder.id()
        );

        registry.terminate_agent(advisor.id()).unwrap();
        assert_eq!(advisor.state(), AgentState::Terminated);
        assert!(registry.get_agent(advisor.id()).is_none());
        assert!(registry.get_agents_by_model("gemini-1.5-pro").is_empty());
        assert!(registry.get_agents_by_role(Role::Advisor).is_empty());

        let err = registry.terminate_agent(advisor.id()).unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentNotFound(_)));
    }

    #[test]
    fn test_direct_terminate_unregisters() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let agent = registry
            .create_agent("documenter", AgentOverrides::default())
            .unwrap();
        assert!(agent.terminate());
        assert!(registry.get_agent(agent.id()).is_none());
    }

    #[test]
    fn test_total_capacity() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Registry::new(
            RegistryConfig {
                max_total_agents: 2,
                ..RegistryConfig::default()
            },
            ValidationConfig::default(),
            Arc::new(LocalBackend::new()),
            temp_dir.path().to_path_buf(),
        );
        registry.register_builtin_types().unwrap();

        registry.create_agent("builder", AgentOverrides::default()).unwrap();
        registry.create_agent("architect", AgentOverrides::default()).unwrap();
        let err = registry
            .create_agent("documenter", AgentOverrides::default())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::CapacityExceeded(_)));
        assert_eq!(registry.statistics().total_agents_created, 2);
    }

    #[test]
    fn test_overrides_cannot_lift_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let advisor = registry
            .create_agent(
                "advisor",
                AgentOverrides::default().with_capabilities(CapabilitySet::all_allowed()),
            )
            .unwrap();
        assert!(advisor.capabilities().is_read_only());
        assert!(!advisor.tools().is_allowed(ToolKind::Write));
    }

    #[test]
    fn test_task_classification() {
        assert_eq!(TaskClass::of("implement_feature"), TaskClass::Producing);
        assert_eq!(TaskClass::of("design-api"), TaskClass::Producing);
        assert_eq!(TaskClass::of("validate_security"), TaskClass::Reviewing);
        assert_eq!(TaskClass::of("Review code"), TaskClass::Reviewing);
        assert_eq!(TaskClass::of("translate_docs"), TaskClass::Specialized);
    }

    #[test]
    fn test_agents_for_task() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        registry.create_agent("builder", AgentOverrides::default()).unwrap();
        registry.create_agent("architect", AgentOverrides::default()).unwrap();
        registry.create_agent("advisor", AgentOverrides::default()).unwrap();
        registry.create_agent("documenter", AgentOverrides::default()).unwrap();

        let producing: Vec<_> = registry
            .get_agents_for_task("implement_feature")
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(producing.len(), 3);
        assert!(!producing.contains(&"advisor".to_string()));

        let reviewing = registry.get_agents_for_task("review_code");
        assert_eq!(reviewing.len(), 1);
        assert_eq!(reviewing[0].name(), "advisor");

        assert!(registry.get_agents_for_task("translate_legal").is_empty());

        let specialized = registry.get_agents_for_task("translate_documentation");
        assert_eq!(specialized.len(), 1);
        assert_eq!(specialized[0].name(), "documenter");
    }

    #[test]
    fn test_paused_agents_sort_last() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let first = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        let second = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        first.pause().unwrap();

        let candidates = registry.get_agents_for_task("fix_bug");
        assert_eq!(candidates[0].id(), second.id());
        assert_eq!(candidates[1].id(), first.id());
        assert_eq!(registry.get_agent_by_name("builder").unwrap().id(), second.id());
    }

    #[test]
    fn test_find_validator_creates_preferred() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let builder = registry.create_agent("builder", AgentOverrides::default()).unwrap();

        let validator = registry.find_validator("advisor", builder.id()).unwrap();
        assert_eq!(validator.name(), "advisor");
        assert!(validator.capabilities().is_read_only());

        let again = registry.find_validator("advisor", builder.id()).unwrap();
        assert_eq!(again.id(), validator.id());
    }

    #[test]
    fn test_find_validator_never_returns_requestor() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Registry::new(
            RegistryConfig {
                max_agents_per_type: 1,
                ..RegistryConfig::default()
            },
            ValidationConfig::default(),
            Arc::new(LocalBackend::new()),
            temp_dir.path().to_path_buf(),
        );
        registry.register_builtin_types().unwrap();
        let advisor = registry.create_agent("advisor", AgentOverrides::default()).unwrap();

        assert!(registry.find_validator("advisor", advisor.id()).is_none());
    }

    #[test]
    fn test_find_validator_falls_back_to_advisor() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let builder = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        let advisor = registry.create_agent("advisor", AgentOverrides::default()).unwrap();

        let found = registry.find_validator("security-auditor", builder.id()).unwrap();
        assert_eq!(found.id(), advisor.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_find_validator_fallback_ignores_validator_role() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let builder = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        registry.create_agent("validator", AgentOverrides::default()).unwrap();

        assert!(registry.find_validator("security-auditor", builder.id()).is_none());
        // the preferred type itself may still be a validator-role agent
        assert_eq!(
            registry.find_validator("validator", builder.id()).unwrap().name(),
            "validator"
        );
    }

    #[test]
    fn test_find_validator_creation_respects_total_cap() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Registry::new(
            RegistryConfig {
                max_total_agents: 2,
                ..RegistryConfig::default()
            },
            ValidationConfig::default(),
            Arc::new(LocalBackend::new()),
            temp_dir.path().to_path_buf(),
        );
        registry.register_builtin_types().unwrap();
        let builder = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        let advisor = registry.create_agent("advisor", AgentOverrides::default()).unwrap();

        let found = registry.find_validator("validator", builder.id()).unwrap();
        assert_eq!(found.id(), advisor.id());
        assert_eq!(registry.len(), 2);
        assert!(registry.get_agents_by_role(Role::Validator).is_empty());

        registry.terminate_agent(advisor.id()).unwrap();
        registry.create_agent("architect", AgentOverrides::default()).unwrap();
        assert!(registry.find_validator("validator", builder.id()).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_find_validator_skips_creative_types() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        assert!(registry.find_validator("builder", AgentId::new_v4()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_session_average() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        registry.record_session_duration(Duration::from_millis(100));
        registry.record_session_duration(Duration::from_millis(300));

        let stats = registry.statistics();
        assert_eq!(stats.sessions_completed, 2);
        assert!((stats.average_session_duration_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_and_health() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        registry.create_agent("builder", AgentOverrides::default()).unwrap();
        registry.create_agent("builder", AgentOverrides::default()).unwrap();

        let stats = registry.statistics();
        assert_eq!(stats.active_agents, 2);
        assert_eq!(stats.agents_by_type["builder"], 2);
        assert_eq!(stats.agents_by_state["ready"], 2);
        assert_eq!(stats.registered_types.len(), 5);

        let health = registry.health_check();
        assert!(health.healthy);
        assert_eq!(health.total_agents, 2);
    }

    #[test]
    fn test_terminate_all() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let builder = registry.create_agent("builder", AgentOverrides::default()).unwrap();
        registry.create_agent("advisor", AgentOverrides::default()).unwrap();

        assert_eq!(registry.terminate_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(builder.state(), AgentState::Terminated);
    }
}
