use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, Result};
use crate::validation::ValidationConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub council: CouncilConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_max_total_agents")]
    pub max_total_agents: usize,
    #[serde(default = "default_max_agents_per_type")]
    pub max_agents_per_type: usize,
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    #[serde(default = "default_true")]
    pub transparent_reasoning: bool,
    #[serde(default = "default_true")]
    pub enable_artifacts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_total_agents() -> usize {
    20
}

fn default_max_agents_per_type() -> usize {
    5
}

fn default_event_capacity() -> usize {
    256
}

fn default_max_participants() -> usize {
    7
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "claude-3-5-sonnet-20240620".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_total_agents: default_max_total_agents(),
            max_agents_per_type: default_max_agents_per_type(),
            definitions_dir: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_participants: default_max_participants(),
            transparent_reasoning: true,
            enable_artifacts: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            council: CouncilConfig::default(),
            validation: ValidationConfig::default(),
            backend: BackendConfig::default(),
            sandbox_root: default_sandbox_root(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, then lets environment variables override it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            self.backend.anthropic_api_key = Some(key);
        }
        if let Some(model) = lookup("PANTHEON_MODEL") {
            self.backend.model = model;
        }
        if let Some(root) = lookup("PANTHEON_SANDBOX") {
            self.sandbox_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("PANTHEON_DEFINITIONS") {
            self.registry.definitions_dir = Some(PathBuf::from(dir));
        }
        if let Some(max) = lookup("PANTHEON_MAX_AGENTS") {
            match max.parse() {
                Ok(n) => self.registry.max_total_agents = n,
                Err(_) => log::warn!("Ignoring invalid PANTHEON_MAX_AGENTS: {}", max),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.max_total_agents == 0 {
            return Err(OrchestratorError::Configuration(
                "registry.max_total_agents must be at least 1".to_string(),
            ));
        }
        if self.registry.max_agents_per_type == 0 {
            return Err(OrchestratorError::Configuration(
                "registry.max_agents_per_type must be at least 1".to_string(),
            ));
        }
        if self.council.max_participants == 0 {
            return Err(OrchestratorError::Configuration(
                "council.max_participants must be at least 1".to_string(),
            ));
        }
        if self.validation.default_threshold > 10 {
            return Err(OrchestratorError::Configuration(
                "validation.default_threshold must be within 0..=10".to_string(),
            ));
        }
        Ok(())
    }
}
