use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::backend::{Analysis, Backend, Generation};
use crate::error::Result;
use crate::types::Issue;

struct Rule {
    pattern: Regex,
    kind: &'static str,
    severity: u8,
    description: &'static str,
    suggestion: &'static str,
}

const RULES: &[(&str, &str, u8, &str, &str)] = &[
    (
        r#"(?i)(password|secret|api_key|token)\s*[:=]\s*["'][^"']+["']"#,
        "security",
        9,
        "hard-coded credential",
        "load credentials from the environment or a secret store",
    ),
    (
        r"\beval\s*\(",
        "security",
        8,
        "dynamic code evaluation",
        "replace eval with an explicit parser",
    ),
    (
        r"\.unwrap\(\)",
        "quality",
        4,
        "unchecked unwrap",
        "propagate the error instead of unwrapping",
    ),
    (
        r"\b(TODO|FIXME)\b",
        "quality",
        3,
        "unfinished work marker",
        "resolve or track outstanding TODO/FIXME markers",
    ),
];

/// Offline backend with deterministic output. Generation echoes a summary
/// of the prompt and analysis applies a fixed set of pattern rules.
pub struct LocalBackend {
    rules: Vec<Rule>,
}

impl LocalBackend {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(pattern, kind, severity, description, suggestion)| {
                match Regex::new(pattern) {
                    Ok(pattern) => Some(Rule {
                        pattern,
                        kind: *kind,
                        severity: *severity,
                        description: *description,
                        suggestion: *suggestion,
                    }),
                    Err(e) => {
                        log::error!("Skipping analysis rule {}: {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self { rules }
    }

    fn flatten(data: &Value) -> String {
        match data {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate(&self, model: &str, prompt: &str, context: &Value) -> Result<Generation> {
        let headline = prompt
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("");

        let mut text = format!("[{}] {}", model, headline);
        if let Some(obj) = context.as_object() {
            if !obj.is_empty() {
                let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
                text.push_str(&format!("\ncontext: {}", keys.join(", ")));
            }
        }

        let tokens = (prompt.split_whitespace().count() + text.split_whitespace().count()) as u64;

        Ok(Generation {
            text,
            tokens_used: Some(tokens),
        })
    }

    async fn analyze(&self, _model: &str, data: &Value, criteria: &[String]) -> Result<Analysis> {
        let text = Self::flatten(data);
        let mut analysis = Analysis::default();

        if text.trim().is_empty() || data.is_null() {
            analysis
                .issues
                .push(Issue::new("completeness", 6, "output is empty"));
            analysis
                .suggestions
                .push("produce a non-empty result".to_string());
            return Ok(analysis);
        }

        for rule in &self.rules {
            if !criteria.is_empty() && !criteria.iter().any(|c| c == rule.kind) {
                continue;
            }

            for (idx, line) in text.lines().enumerate() {
                if rule.pattern.is_match(line) {
                    analysis.issues.push(
                        Issue::new(rule.kind, rule.severity, rule.description)
                            .at(format!("line {}", idx + 1)),
                    );
                    if !analysis.suggestions.iter().any(|s| s == rule.suggestion) {
                        analysis.suggestions.push(rule.suggestion.to_string());
                    }
                }
            }
        }

        Ok(analysis)
    }
}
