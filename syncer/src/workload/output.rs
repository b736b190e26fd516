use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::state::aggregated::AggregatedState;
use crate::workload::failure::FailureReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of a replication attempt as materialized by the workload that ran it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationOutput {
    pub status: ReplicationStatus,
    /// Checkpoint to resume the next attempt from.
    #[serde(default)]
    pub state: Option<AggregatedState>,
    #[serde(default)]
    pub failures: Vec<FailureReason>,
    #[serde(default)]
    pub records_synced: u64,
    #[serde(default)]
    pub bytes_synced: u64,
}

impl ReplicationOutput {
    pub fn completed(state: Option<AggregatedState>) -> Self {
        Self {
            status: ReplicationStatus::Completed,
            state,
            failures: vec![],
            records_synced: 0,
            bytes_synced: 0,
        }
    }

    pub fn failed(failure: FailureReason) -> Self {
        Self {
            status: ReplicationStatus::Failed,
            state: None,
            failures: vec![failure],
            records_synced: 0,
            bytes_synced: 0,
        }
    }

    pub fn cancelled(failure: FailureReason) -> Self {
        Self {
            status: ReplicationStatus::Cancelled,
            ..Self::failed(failure)
        }
    }

    pub fn with_stats(mut self, records_synced: u64, bytes_synced: u64) -> Self {
        self.records_synced = records_synced;
        self.bytes_synced = bytes_synced;
        self
    }
}

/// Document store holding the output of finished workloads, keyed by workload id.
pub trait OutputStore {
    /// Returns the raw output of a workload, [`None`] if none was written.
    fn read(&self, workload_id: &str) -> impl Future<Output = SyncResult<Option<Value>>> + Send;
}

#[derive(Debug, Default)]
struct Inner {
    outputs: HashMap<String, Value>,
}

/// In-memory output store.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutputStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the output of a workload.
    pub async fn write(&self, workload_id: &str, output: &ReplicationOutput) -> SyncResult<()> {
        let output = serde_json::to_value(output).map_err(SyncError::serialization)?;
        self.write_raw(workload_id, output).await;

        Ok(())
    }

    /// Stores an arbitrary document as the output of a workload.
    pub async fn write_raw(&self, workload_id: &str, output: Value) {
        let mut inner = self.inner.lock().await;
        inner.outputs.insert(workload_id.to_owned(), output);
    }
}

impl OutputStore for MemoryOutputStore {
    async fn read(&self, workload_id: &str) -> SyncResult<Option<Value>> {
        let inner = self.inner.lock().await;

        Ok(inner.outputs.get(workload_id).cloned())
    }
}
