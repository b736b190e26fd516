use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry policy for calls to the workload control plane and the state API.
///
/// The policy is bounded by elapsed time rather than by attempt count: a call is retried with a
/// fixed delay until `max_elapsed_ms` has passed since the first attempt. A long control-plane
/// outage therefore only fails a sync once the whole budget is spent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiRetryConfig {
    /// Total time, in milliseconds, during which failed calls are retried.
    pub max_elapsed_ms: u64,
    /// Fixed delay, in milliseconds, between two attempts.
    pub delay_ms: u64,
}

impl ApiRetryConfig {
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Validates the policy. `name` identifies the policy in error messages.
    pub fn validate(&self, name: &'static str) -> Result<(), ValidationError> {
        if self.delay_ms == 0 {
            return Err(ValidationError::ZeroDuration(name));
        }

        if self.delay_ms > self.max_elapsed_ms {
            return Err(ValidationError::DelayExceedsBudget(name));
        }

        Ok(())
    }
}

impl Default for ApiRetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed_ms: 10 * 60 * 1_000,
            delay_ms: 1_000,
        }
    }
}
