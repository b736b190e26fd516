use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{ApiRetryConfig, ValidationError};

/// Configuration of buffered checkpoint persistence during a sync.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StateFlushConfig {
    /// Minimum time, in milliseconds, between two periodic flushes of buffered checkpoints.
    pub flush_period_ms: u64,
    /// Retry policy for the final flush performed when the sync closes.
    #[serde(default)]
    pub final_flush_retry: ApiRetryConfig,
}

impl StateFlushConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_millis(self.flush_period_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.flush_period_ms == 0 {
            return Err(ValidationError::ZeroDuration("state_flush.flush_period_ms"));
        }

        self.final_flush_retry
            .validate("state_flush.final_flush_retry")
    }
}

impl Default for StateFlushConfig {
    fn default() -> Self {
        Self {
            flush_period_ms: 60_000,
            final_flush_retry: ApiRetryConfig {
                max_elapsed_ms: 2 * 60 * 1_000,
                delay_ms: 5_000,
            },
        }
    }
}
