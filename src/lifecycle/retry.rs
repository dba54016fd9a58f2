use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const BACKOFF_RANGE: (f64, f64) = (1.0, 5.0);
pub const INITIAL_DELAY_RANGE_MS: (u64, u64) = (100, 10_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_initial_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(OrchestratorError::Configuration(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }

        let (min_backoff, max_backoff) = BACKOFF_RANGE;
        if !(min_backoff..=max_backoff).contains(&self.backoff_multiplier) {
            return Err(OrchestratorError::Configuration(format!(
                "backoff_multiplier must be within {}..={}, got {}",
                min_backoff, max_backoff, self.backoff_multiplier
            )));
        }

        let (min_delay, max_delay) = INITIAL_DELAY_RANGE_MS;
        if !(min_delay..=max_delay).contains(&self.initial_delay_ms) {
            return Err(OrchestratorError::Configuration(format!(
                "initial_delay_ms must be within {}..={}, got {}",
                min_delay, max_delay, self.initial_delay_ms
            )));
        }

        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// `retry_count` is the number of attempts already made beyond the first.
    pub fn should_retry(&self, retry_count: u32, error: &OrchestratorError) -> bool {
        retry_count < self.max_retries && error.is_retryable()
    }

    /// Delay before attempt number `retry_count` (1-based):
    /// `initial_delay * backoff_multiplier^(retry_count - 1)`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }
}
