use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{StateFlushConfig, ValidationError, WorkloadConfig};

/// Top-level configuration of a sync worker.
///
/// Typically loaded once at startup with [`crate::load_config`] and handed to the workload client
/// and the state persistence layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncWorkerConfig {
    /// Workload lifecycle settings.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Checkpoint flushing settings.
    #[serde(default)]
    pub state_flush: StateFlushConfig,
}

impl SyncWorkerConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.workload.validate()?;
        self.state_flush.validate()?;

        Ok(())
    }
}

impl Config for SyncWorkerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
