pub mod pipeline;

pub use pipeline::{ValidationPipeline, ValidationRequest, ValidationRouter, ValidationStats, ValidatorReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreExecution,
    PostExecution,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreExecution => "pre_execution",
            Stage::PostExecution => "post_execution",
        }
    }

    /// Task type a validator agent receives for this stage.
    pub fn task_type(&self) -> String {
        format!("validate_{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub stage: Stage,
    pub validator: Option<String>,
    pub passed: bool,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub requires_refinement: bool,
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn skipped(stage: Stage) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            validator: None,
            passed: true,
            issues: Vec::new(),
            suggestions: Vec::new(),
            requires_refinement: false,
            skipped: true,
            timestamp: Utc::now(),
        }
    }

    /// Issues and suggestions flattened into refinement feedback lines.
    pub fn feedback(&self) -> Vec<String> {
        self.issues
            .iter()
            .map(|i| match &i.location {
                Some(loc) => format!("[{}:{}] {} ({})", i.kind, i.severity, i.description, loc),
                None => format!("[{}:{}] {}", i.kind, i.severity, i.description),
            })
            .chain(self.suggestions.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,
    #[serde(default = "default_preferred_validator")]
    pub preferred_validator: String,
    #[serde(default = "default_threshold")]
    pub default_threshold: u8,
    #[serde(default = "default_kind_thresholds")]
    pub thresholds: BTreeMap<String, u8>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_stages() -> Vec<Stage> {
    vec![Stage::PreExecution, Stage::PostExecution]
}

fn default_preferred_validator() -> String {
    "advisor".to_string()
}

fn default_threshold() -> u8 {
    5
}

fn default_kind_thresholds() -> BTreeMap<String, u8> {
    BTreeMap::from([("security".to_string(), 8)])
}

fn default_history_limit() -> usize {
    100
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            preferred_validator: default_preferred_validator(),
            default_threshold: default_threshold(),
            thresholds: default_kind_thresholds(),
            history_limit: default_history_limit(),
        }
    }
}

impl ValidationConfig {
    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn threshold_for(&self, kind: &str) -> u8 {
        self.thresholds
            .get(kind)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn is_blocking(&self, issue: &Issue) -> bool {
        issue.severity >= self.threshold_for(&issue.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let config = ValidationConfig::default();
        assert_eq!(config.threshold_for("security"), 8);
        assert_eq!(config.threshold_for("quality"), 5);

        assert!(!config.is_blocking(&Issue::new("security", 7, "weak hash")));
        assert!(config.is_blocking(&Issue::new("security", 8, "sql injection")));
        assert!(config.is_blocking(&Issue::new("quality", 5, "dead code")));
    }

    #[test]
    fn test_stage_task_types() {
        assert_eq!(Stage::PreExecution.task_type(), "validate_pre_execution");
        assert_eq!(Stage::PostExecution.task_type(), "validate_post_execution");
    }

    #[test]
    fn test_feedback_lines() {
        let mut result = ValidationResult::skipped(Stage::PostExecution);
        result.issues.push(Issue::new("quality", 4, "unchecked unwrap").at("line 3"));
        result.suggestions.push("propagate errors".to_string());

        assert_eq!(
            result.feedback(),
            vec![
                "[quality:4] unchecked unwrap (line 3)".to_string(),
                "propagate errors".to_string()
            ]
        );
    }
}
