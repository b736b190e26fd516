use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use syncer_config::shared::WorkloadPriorityConfig;
use uuid::Uuid;

/// Status of a workload as reported by the control plane.
///
/// Only the control plane moves a workload between statuses, clients observe them by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Pending,
    Claimed,
    Launched,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl WorkloadStatus {
    /// Returns `true` once the workload can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Launched => "launched",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    Sync,
    Check,
    Discover,
    Spec,
}

impl WorkloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Check => "check",
            Self::Discover => "discover",
            Self::Spec => "spec",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPriority {
    High,
    #[default]
    Default,
}

impl From<WorkloadPriorityConfig> for WorkloadPriority {
    fn from(value: WorkloadPriorityConfig) -> Self {
        match value {
            WorkloadPriorityConfig::High => Self::High,
            WorkloadPriorityConfig::Default => Self::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadLabel {
    pub key: String,
    pub value: String,
}

impl WorkloadLabel {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// Everything the control plane needs to schedule a workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadCreateRequest {
    pub workload_id: String,
    pub labels: Vec<WorkloadLabel>,
    /// Opaque to the control plane, handed as is to the process running the workload.
    pub workload_input: Value,
    pub log_path: String,
    pub workload_type: WorkloadType,
    pub priority: WorkloadPriority,
    pub workspace_id: Uuid,
    pub organization_id: Option<Uuid>,
    /// At most one workload sharing a mutex key runs at a time. Enforced by the control plane.
    pub mutex_key: Option<String>,
    pub dataplane_group: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// A workload as last reported by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub id: String,
    pub status: WorkloadStatus,
    pub termination_source: Option<String>,
    pub termination_reason: Option<String>,
    pub mutex_key: Option<String>,
    pub labels: Vec<WorkloadLabel>,
    pub priority: WorkloadPriority,
    pub workload_type: WorkloadType,
    pub dataplane_group: Option<String>,
}

impl Workload {
    /// Builds the pending workload the control plane registers for `request`.
    pub fn pending(request: &WorkloadCreateRequest) -> Self {
        Self {
            id: request.workload_id.clone(),
            status: WorkloadStatus::Pending,
            termination_source: None,
            termination_reason: None,
            mutex_key: request.mutex_key.clone(),
            labels: request.labels.clone(),
            priority: request.priority,
            workload_type: request.workload_type,
            dataplane_group: request.dataplane_group.clone(),
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadCancelRequest {
    pub workload_id: String,
    pub reason: String,
    pub source: String,
}

/// Returns the id of the sync workload of an attempt.
///
/// The id only depends on the attempt, so submitting the same attempt twice targets the same
/// workload.
pub fn sync_workload_id(connection_id: Uuid, job_id: i64, attempt_number: i32) -> String {
    format!(
        "{connection_id}_{job_id}_{attempt_number}_{}",
        WorkloadType::Sync.as_str()
    )
}
