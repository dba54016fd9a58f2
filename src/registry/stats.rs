use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::agent::Agent;
use crate::types::{AgentId, AgentState};

const MIN_TASKS_FOR_RATE: u64 = 4;
const MIN_SUCCESS_RATE: f64 = 0.5;
const CAPACITY_WARNING: f64 = 0.9;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_agents_created: u64,
    pub active_agents: usize,
    pub max_total_agents: usize,
    pub total_tasks_executed: u64,
    pub total_errors: u64,
    pub total_validations: u64,
    pub sessions_completed: u64,
    pub average_session_duration_ms: f64,
    pub agents_by_type: BTreeMap<String, usize>,
    pub agents_by_model: BTreeMap<String, usize>,
    pub agents_by_role: BTreeMap<String, usize>,
    pub agents_by_state: BTreeMap<String, usize>,
    pub registered_types: Vec<String>,
}

impl RegistryStatistics {
    pub(crate) fn tally(&mut self, agent: &Agent) {
        *self
            .agents_by_type
            .entry(agent.name().to_string())
            .or_default() += 1;
        *self
            .agents_by_model
            .entry(agent.model().to_string())
            .or_default() += 1;
        *self
            .agents_by_role
            .entry(agent.role().as_str().to_string())
            .or_default() += 1;
        *self
            .agents_by_state
            .entry(agent.state().as_str().to_string())
            .or_default() += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub id: AgentId,
    pub name: String,
    pub state: AgentState,
    pub tasks_executed: u64,
    pub success_rate: f64,
    pub recent_errors: usize,
    pub healthy: bool,
}

impl AgentHealth {
    /// An agent is unhealthy when stuck in `Error` or when it has a track
    /// record and fails more often than it succeeds.
    pub fn assess(agent: &Agent) -> Self {
        let status = agent.status();
        let rate_ok = status.metrics.tasks_executed < MIN_TASKS_FOR_RATE
            || status.metrics.success_rate >= MIN_SUCCESS_RATE;

        Self {
            id: status.id,
            name: status.name,
            state: status.state,
            tasks_executed: status.metrics.tasks_executed,
            success_rate: status.metrics.success_rate,
            recent_errors: status.metrics.recent_errors.len(),
            healthy: status.state != AgentState::Error && rate_ok,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub total_agents: usize,
    pub capacity_used: f64,
    pub issues: Vec<String>,
    pub agents: Vec<AgentHealth>,
}

impl HealthReport {
    pub(crate) fn build(agents: &[std::sync::Arc<Agent>], max_total_agents: usize) -> Self {
        let agents: Vec<AgentHealth> = agents.iter().map(|a| AgentHealth::assess(a)).collect();
        let capacity_used = if max_total_agents == 0 {
            1.0
        } else {
            agents.len() as f64 / max_total_agents as f64
        };

        let mut issues: Vec<String> = agents
            .iter()
            .filter(|a| !a.healthy)
            .map(|a| {
                format!(
                    "{} ({}) is unhealthy: state={} success_rate={:.2}",
                    a.name,
                    a.id,
                    a.state.as_str(),
                    a.success_rate
                )
            })
            .collect();
        if capacity_used >= CAPACITY_WARNING {
            issues.push(format!(
                "registry at {:.0}% of capacity ({}/{})",
                capacity_used * 100.0,
                agents.len(),
                max_total_agents
            ));
        }

        Self {
            healthy: issues.is_empty(),
            checked_at: Utc::now(),
            total_agents: agents.len(),
            capacity_used,
            issues,
            agents,
        }
    }
}
