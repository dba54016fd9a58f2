use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::backend::{Analysis, Backend, Generation};
use crate::error::{OrchestratorError, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-3-5-sonnet-20240620".to_string(),
            max_tokens: 4096,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Agent models outside the Claude family (e.g. advisor models) fall
    /// back to the configured default.
    fn resolve_model(&self, model: &str) -> String {
        if model.starts_with("claude-") {
            model.to_string()
        } else {
            self.model.clone()
        }
    }

    async fn complete(&self, model: &str, system: Option<String>, prompt: String) -> Result<Generation> {
        let request = MessagesRequest {
            model: self.resolve_model(model),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            system,
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Backend(format!("malformed response: {}", e)))?;

        let text = result
            .content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(OrchestratorError::Backend("no content in response".to_string()));
        }

        Ok(Generation {
            text,
            tokens_used: result.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }
}

fn classify_transport_error(e: reqwest::Error) -> OrchestratorError {
    if e.is_timeout() || e.is_connect() {
        OrchestratorError::connection_reset(e.to_string())
    } else {
        OrchestratorError::Backend(e.to_string())
    }
}

fn classify_status(status: u16, body: &str) -> OrchestratorError {
    match status {
        429 | 529 => OrchestratorError::rate_limited(format!("HTTP {}: {}", status, body)),
        502..=504 => OrchestratorError::connection_reset(format!("HTTP {}: {}", status, body)),
        _ => OrchestratorError::Backend(format!("Anthropic API error {}: {}", status, body)),
    }
}

/// Pulls the first JSON object out of a model reply.
fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, model: &str, prompt: &str, context: &Value) -> Result<Generation> {
        let system = context
            .get("system")
            .and_then(Value::as_str)
            .map(String::from);

        let prompt = match context.get("data") {
            Some(data) if !data.is_null() => format!(
                "{}\n\nContext:\n{}",
                prompt,
                serde_json::to_string_pretty(data).unwrap_or_default()
            ),
            _ => prompt.to_string(),
        };

        self.complete(model, system, prompt).await
    }

    async fn analyze(&self, model: &str, data: &Value, criteria: &[String]) -> Result<Analysis> {
        let criteria = if criteria.is_empty() {
            "correctness, security, quality".to_string()
        } else {
            criteria.join(", ")
        };

        let system = "You are a read-only reviewer. Respond with a single JSON object: \
            {\"passed\": bool, \"issues\": [{\"kind\": string, \"severity\": 0-10, \"description\": string, \"location\": string|null}], \"suggestions\": [string]}"
            .to_string();
        let prompt = format!(
            "Review the following against these criteria: {}\n\n{}",
            criteria,
            serde_json::to_string_pretty(data).unwrap_or_default()
        );

        let generation = self.complete(model, Some(system), prompt).await?;
        let value = extract_json(&generation.text).ok_or_else(|| {
            OrchestratorError::Backend("analysis reply did not contain JSON".to_string())
        })?;

        serde_json::from_value(value)
            .map_err(|e| OrchestratorError::Backend(format!("malformed analysis: {}", e)))
    }
}
