use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{ApiRetryConfig, ValidationError};

/// Scheduling priority requested for a workload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPriorityConfig {
    High,
    #[default]
    Default,
}

/// Configuration of the workload lifecycle client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkloadConfig {
    /// Interval, in milliseconds, between two status polls of a running workload.
    pub poll_interval_ms: u64,
    /// Retry policy wrapped around every control-plane call.
    #[serde(default)]
    pub api_retry: ApiRetryConfig,
    /// Priority requested when creating a workload.
    #[serde(default)]
    pub priority: WorkloadPriorityConfig,
    /// Dataplane group the workload should run in, if pinned.
    #[serde(default)]
    pub dataplane_group: Option<String>,
    /// Prefix of the log path handed to the control plane.
    #[serde(default = "default_log_path_prefix")]
    pub log_path_prefix: String,
    /// Optional deadline, in seconds from creation, after which the control plane gives up on a
    /// workload that never started.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_log_path_prefix() -> String {
    "workload/logs".to_owned()
}

impl WorkloadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration("workload.poll_interval_ms"));
        }

        if self.log_path_prefix.trim().is_empty() {
            return Err(ValidationError::InvalidConfig(
                "workload.log_path_prefix cannot be empty".to_owned(),
            ));
        }

        self.api_retry.validate("workload.api_retry")
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 30_000,
            api_retry: ApiRetryConfig::default(),
            priority: WorkloadPriorityConfig::default(),
            dataplane_group: None,
            log_path_prefix: default_log_path_prefix(),
            deadline_secs: None,
        }
    }
}
