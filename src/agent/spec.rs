use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestratorError, Result};
use crate::lifecycle::RetryPolicy;
use crate::tools::ToolKind;
use crate::types::{CapabilitySet, Role};

pub const TIMEOUT_RANGE_MS: (u64, u64) = (1_000, 600_000);
pub const MAX_TOKENS_RANGE: (u32, u32) = (100, 100_000);

/// Declarative description of an agent before construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub model: String,
    pub role: Role,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub tools: Vec<ToolKind>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_tokens() -> u32 {
    4096
}

impl AgentSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        model: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            model: model.into(),
            role,
            specialization: None,
            capabilities: CapabilitySet::default(),
            tools: Vec::new(),
            retry_policy: RetryPolicy::default(),
            timeout_ms: default_timeout_ms(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolKind>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(OrchestratorError::Configuration(format!(
                "agent name '{}' must start with a lowercase letter and contain only a-z, 0-9 and '-'",
                self.name
            )));
        }

        if self.description.trim().is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "agent '{}' needs a description",
                self.name
            )));
        }

        if self.model.trim().is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "agent '{}' needs a model",
                self.name
            )));
        }

        let (min_timeout, max_timeout) = TIMEOUT_RANGE_MS;
        if !(min_timeout..=max_timeout).contains(&self.timeout_ms) {
            return Err(OrchestratorError::Configuration(format!(
                "agent '{}' timeout must be within {}..={}ms, got {}",
                self.name, min_timeout, max_timeout, self.timeout_ms
            )));
        }

        let (min_tokens, max_tokens) = MAX_TOKENS_RANGE;
        if !(min_tokens..=max_tokens).contains(&self.max_tokens) {
            return Err(OrchestratorError::Configuration(format!(
                "agent '{}' max_tokens must be within {}..={}, got {}",
                self.name, min_tokens, max_tokens, self.max_tokens
            )));
        }

        self.retry_policy.validate()
    }
}

/// `^[a-z][a-z0-9-]*$`
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
