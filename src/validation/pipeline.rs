use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Stage, ValidationConfig, ValidationResult};
use crate::error::Result;
use crate::events::{DomainEvent, EventBus};
use crate::providers::Analysis;
use crate::types::AgentId;

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub stage: Stage,
    pub requestor_id: AgentId,
    pub requestor: String,
    pub preferred_validator: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct ValidatorReport {
    pub validator: String,
    pub analysis: Analysis,
}

/// Locates a read-only validator and runs the review. `Ok(None)` means no
/// validator could be found.
#[async_trait]
pub trait ValidationRouter: Send + Sync {
    async fn route(&self, request: &ValidationRequest) -> Result<Option<ValidatorReport>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub refinements_required: usize,
    pub by_stage: BTreeMap<String, usize>,
}

pub struct ValidationPipeline {
    config: ValidationConfig,
    router: Arc<dyn ValidationRouter>,
    history: Mutex<VecDeque<ValidationResult>>,
    events: Option<EventBus>,
}

impl ValidationPipeline {
    pub fn new(config: ValidationConfig, router: Arc<dyn ValidationRouter>) -> Self {
        Self {
            config,
            router,
            history: Mutex::new(VecDeque::new()),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        self.config.is_enabled(stage)
    }

    pub async fn validate(
        &self,
        stage: Stage,
        requestor_id: AgentId,
        requestor: &str,
        data: Value,
    ) -> Result<ValidationResult> {
        let request = ValidationRequest {
            stage,
            requestor_id,
            requestor: requestor.to_string(),
            preferred_validator: self.config.preferred_validator.clone(),
            data,
        };

        let result = match self.router.route(&request).await? {
            Some(report) => self.evaluate(stage, report),
            None => {
                log::warn!(
                    "No validator available for {} ({}), skipping {}",
                    requestor,
                    requestor_id,
                    stage.as_str()
                );
                ValidationResult::skipped(stage)
            }
        };

        log::debug!(
            "{} validation for {}: passed={} issues={} refine={}",
            stage.as_str(),
            requestor,
            result.passed,
            result.issues.len(),
            result.requires_refinement
        );

        self.record(result.clone());

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ValidationCompleted {
                agent_id: requestor_id,
                stage: stage.as_str().to_string(),
                passed: result.passed,
                skipped: result.skipped,
            });
        }

        Ok(result)
    }

    fn evaluate(&self, stage: Stage, report: ValidatorReport) -> ValidationResult {
        let analysis = report.analysis;
        let blocking = analysis
            .issues
            .iter()
            .any(|issue| self.config.is_blocking(issue));
        let passed = analysis.passed.unwrap_or(!blocking);

        ValidationResult {
            id: Uuid::new_v4(),
            stage,
            validator: Some(report.validator),
            passed,
            issues: analysis.issues,
            suggestions: analysis.suggestions,
            requires_refinement: !passed || blocking,
            skipped: false,
            timestamp: Utc::now(),
        }
    }

    fn record(&self, result: ValidationResult) {
        let mut history = match self.history.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        history.push_back(result);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<ValidationResult> {
        match self.history.lock() {
            Ok(h) => h.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn statistics(&self) -> ValidationStats {
        let mut stats = ValidationStats::default();
        for result in self.history() {
            stats.total += 1;
            if result.skipped {
                stats.skipped += 1;
            } else if result.passed {
                stats.passed += 1;
            } else {
                stats.failed += 1;
            }
            if result.requires_refinement {
                stats.refinements_required += 1;
            }
            *stats
                .by_stage
                .entry(result.stage.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Issue;
    use serde_json::json;

    struct FixedRouter {
        report: Option<Analysis>,
    }

    #[async_trait]
    impl ValidationRouter for FixedRouter {
        async fn route(&self, _request: &ValidationRequest) -> Result<Option<ValidatorReport>> {
            Ok(self.report.clone().map(|analysis| ValidatorReport {
                validator: "advisor".to_string(),
                analysis,
            }))
        }
    }

    fn pipeline(report: Option<Analysis>) -> ValidationPipeline {
        ValidationPipeline::new(ValidationConfig::default(), Arc::new(FixedRouter { report }))
    }

    #[tokio::test]
    async fn test_missing_validator_skips() {
        let pipeline = pipeline(None);
        let result = pipeline
            .validate(Stage::PreExecution, AgentId::new_v4(), "builder", json!({}))
            .await
            .unwrap();

        assert!(result.skipped);
        assert!(result.passed);
        assert!(!result.requires_refinement);
        assert_eq!(pipeline.statistics().skipped, 1);
    }

    #[tokio::test]
    async fn test_security_threshold() {
        let below = Analysis {
            issues: vec![Issue::new("security", 7, "md5 used")],
            ..Analysis::default()
        };
        let result = pipeline(Some(below))
            .validate(Stage::PostExecution, AgentId::new_v4(), "builder", json!("x"))
            .await
            .unwrap();
        assert!(result.passed);
        assert!(!result.requires_refinement);

        let above = Analysis {
            issues: vec![Issue::new("security", 9, "hard-coded credential")],
            ..Analysis::default()
        };
        let result = pipeline(Some(above))
            .validate(Stage::PostExecution, AgentId::new_v4(), "builder", json!("x"))
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result.requires_refinement);
        assert_eq!(result.validator.as_deref(), Some("advisor"));
    }

    #[tokio::test]
    async fn test_explicit_verdict_wins() {
        let analysis = Analysis {
            passed: Some(false),
            issues: vec![],
            suggestions: vec!["add tests".to_string()],
        };
        let result = pipeline(Some(analysis))
            .validate(Stage::PostExecution, AgentId::new_v4(), "builder", json!("x"))
            .await
            .unwrap();
        assert!(!result.passed);
        assert!(result.requires_refinement);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut config = ValidationConfig::default();
        config.history_limit = 2;
        let pipeline = ValidationPipeline::new(
            config,
            Arc::new(FixedRouter {
                report: Some(Analysis::default()),
            }),
        );

        for _ in 0..3 {
            pipeline
                .validate(Stage::PreExecution, AgentId::new_v4(), "builder", json!({}))
                .await
                .unwrap();
        }

        let stats = pipeline.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.by_stage.get("pre_execution"), Some(&2));
    }
}
