use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{ErrorKind, OrchestratorError};
use crate::types::{Task, TaskId};

const DURATION_WINDOW: usize = 100;
const ERROR_WINDOW: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub task_id: TaskId,
    pub task_type: String,
    pub kind: ErrorKind,
    pub message: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentMetrics {
    tasks_executed: u64,
    tasks_succeeded: u64,
    tasks_failed: u64,
    total_duration: Duration,
    durations: VecDeque<Duration>,
    tokens_used: u64,
    validations_triggered: u64,
    refinements_performed: u64,
    errors: VecDeque<ErrorRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tasks_executed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub tokens_used: u64,
    pub validations_triggered: u64,
    pub refinements_performed: u64,
    pub recent_errors: Vec<ErrorRecord>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_duration(&mut self, duration: Duration) {
        self.tasks_executed += 1;
        self.total_duration += duration;
        self.durations.push_back(duration);
        if self.durations.len() > DURATION_WINDOW {
            self.durations.pop_front();
        }
    }

    pub fn record_success(&mut self, duration: Duration, tokens: Option<u64>) {
        self.record_duration(duration);
        self.tasks_succeeded += 1;
        self.tokens_used += tokens.unwrap_or(0);
    }

    pub fn record_failure(&mut self, duration: Duration, task: &Task, error: &OrchestratorError) {
        self.record_duration(duration);
        self.tasks_failed += 1;
        self.errors.push_back(ErrorRecord {
            task_id: task.id,
            task_type: task.task_type.clone(),
            kind: error.kind(),
            message: error.to_string(),
            retry_count: task.retry_count,
            timestamp: Utc::now(),
        });
        if self.errors.len() > ERROR_WINDOW {
            self.errors.pop_front();
        }
    }

    pub fn record_validation(&mut self) {
        self.validations_triggered += 1;
    }

    pub fn record_refinement(&mut self) {
        self.refinements_performed += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.tasks_executed == 0 {
            1.0
        } else {
            self.tasks_succeeded as f64 / self.tasks_executed as f64
        }
    }

    /// Nearest-rank percentile over the recent duration window.
    fn percentile(sorted: &[Duration], p: f64) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let idx = rank.clamp(1, sorted.len()) - 1;
        sorted[idx].as_millis() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut sorted: Vec<Duration> = self.durations.iter().copied().collect();
        sorted.sort();

        let average_duration_ms = if self.tasks_executed == 0 {
            0.0
        } else {
            self.total_duration.as_millis() as f64 / self.tasks_executed as f64
        };

        MetricsSnapshot {
            tasks_executed: self.tasks_executed,
            tasks_succeeded: self.tasks_succeeded,
            tasks_failed: self.tasks_failed,
            success_rate: self.success_rate(),
            average_duration_ms,
            p50_ms: Self::percentile(&sorted, 50.0),
            p95_ms: Self::percentile(&sorted, 95.0),
            p99_ms: Self::percentile(&sorted, 99.0),
            tokens_used: self.tokens_used,
            validations_triggered: self.validations_triggered,
            refinements_performed: self.refinements_performed,
            recent_errors: self.errors.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_percentiles() {
        let mut metrics = AgentMetrics::new();
        for ms in 1..=100 {
            metrics.record_success(Duration::from_millis(ms), Some(10));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.p50_ms, 50);
        assert_eq!(snapshot.p95_ms, 95);
        assert_eq!(snapshot.p99_ms, 99);
        assert_eq!(snapshot.tokens_used, 1000);
        assert_eq!(snapshot.success_rate, 1.0);
    }

    #[test]
    fn test_error_window() {
        let mut metrics = AgentMetrics::new();
        let task = Task::new("implement_feature", json!({}));
        for _ in 0..25 {
            metrics.record_failure(
                Duration::from_millis(5),
                &task,
                &OrchestratorError::Backend("boom".into()),
            );
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_failed, 25);
        assert_eq!(snapshot.recent_errors.len(), ERROR_WINDOW);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.recent_errors[0].kind, ErrorKind::Backend);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = AgentMetrics::new().snapshot();
        assert_eq!(snapshot.tasks_executed, 0);
        assert_eq!(snapshot.p99_ms, 0);
        assert_eq!(snapshot.average_duration_ms, 0.0);
    }
}
