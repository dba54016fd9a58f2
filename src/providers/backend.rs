use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::Issue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

/// A reviewer's verdict. `passed` is `None` when the backend leaves the
/// decision to severity thresholds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The language-model collaborator. Failures worth retrying are reported as
/// `OrchestratorError::TransientBackend`.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, model: &str, prompt: &str, context: &Value) -> Result<Generation>;

    async fn analyze(&self, model: &str, data: &Value, criteria: &[String]) -> Result<Analysis>;
}
