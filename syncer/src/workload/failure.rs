use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workload::model::{Workload, WorkloadStatus};

/// Metadata key holding the raw termination source of the workload.
const TERMINATION_SOURCE_KEY: &str = "terminationSource";
const WORKLOAD_ID_KEY: &str = "workloadId";

/// Marker of a connector image that could not be pulled, a configuration problem of the user.
const IMAGE_PULL_FAILURE: &str = "failed to pull container image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    Source,
    Destination,
    Replication,
    Platform,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    SystemError,
    ConfigError,
    TransientError,
    ManualCancellation,
    HeartbeatTimeout,
}

/// Structured, attributed reason of a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub failure_origin: FailureOrigin,
    pub failure_type: FailureType,
    pub internal_message: Option<String>,
    pub external_message: Option<String>,
    pub retryable: Option<bool>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FailureReason {
    pub fn new(failure_origin: FailureOrigin, failure_type: FailureType) -> Self {
        Self {
            failure_origin,
            failure_type,
            internal_message: None,
            external_message: None,
            retryable: None,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_failure_type(mut self, failure_type: FailureType) -> Self {
        self.failure_type = failure_type;
        self
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    pub fn with_external_message(mut self, message: impl Into<String>) -> Self {
        self.external_message = Some(message.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Party a workload's terminal status is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSource {
    Source,
    Destination,
    /// The platform component starting workloads.
    Launcher,
    /// The platform component tracking running workloads.
    Monitor,
    Unknown,
}

impl FromStr for TerminationSource {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "source" => Self::Source,
            "destination" => Self::Destination,
            "workload-launcher" => Self::Launcher,
            "workload-monitor" => Self::Monitor,
            _ => Self::Unknown,
        })
    }
}

impl TerminationSource {
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(|value| value.parse().ok())
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for TerminationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Destination => f.write_str("destination"),
            Self::Launcher => f.write_str("workload-launcher"),
            Self::Monitor => f.write_str("workload-monitor"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Builds the failure reason of a workload whose output could not be read.
///
/// A successful workload without readable output is an internal inconsistency. Failed and
/// cancelled workloads are attributed from their termination source, and the raw termination
/// reason is kept as the internal message.
pub fn classify_missing_output(workload: &Workload) -> FailureReason {
    match workload.status {
        WorkloadStatus::Success => {
            FailureReason::new(FailureOrigin::Platform, FailureType::SystemError)
                .with_external_message("Failed to read the output")
                .with_internal_message(format!(
                    "Failed to read the output of successful workload {}",
                    workload.id
                ))
                .with_metadata(WORKLOAD_ID_KEY, workload.id.as_str())
        }
        WorkloadStatus::Failure | WorkloadStatus::Cancelled => classify_termination(workload),
        status => FailureReason::new(FailureOrigin::Platform, FailureType::SystemError)
            .with_external_message(format!("{} is still running, try again later", workload.id))
            .with_internal_message(format!(
                "Workload {} is {status}, no output is available before a terminal status",
                workload.id
            ))
            .with_metadata(WORKLOAD_ID_KEY, workload.id.as_str()),
    }
}

fn classify_termination(workload: &Workload) -> FailureReason {
    let source = TerminationSource::parse(workload.termination_source.as_deref());
    let reason = workload.termination_reason.as_deref();

    let failure = match source {
        TerminationSource::Source => {
            FailureReason::new(FailureOrigin::Source, FailureType::SystemError)
                .with_external_message(
                    reason.unwrap_or("Something went wrong within the source connector"),
                )
        }
        TerminationSource::Destination => {
            FailureReason::new(FailureOrigin::Destination, FailureType::SystemError)
                .with_external_message(
                    reason.unwrap_or("Something went wrong within the destination connector"),
                )
        }
        TerminationSource::Launcher => {
            FailureReason::new(FailureOrigin::Platform, FailureType::SystemError)
                .with_external_message("The platform could not start the sync process")
        }
        TerminationSource::Monitor => {
            FailureReason::new(FailureOrigin::Platform, FailureType::TransientError)
                .with_external_message("The platform could not track the progress of the sync")
        }
        TerminationSource::Unknown => {
            FailureReason::new(FailureOrigin::Platform, FailureType::SystemError)
                .with_external_message(
                    reason.unwrap_or("Something went wrong within the platform"),
                )
        }
    };

    let failure = match workload.status {
        WorkloadStatus::Cancelled => failure.with_failure_type(FailureType::ManualCancellation),
        _ if reason.is_some_and(is_image_pull_failure) => {
            failure.with_failure_type(FailureType::ConfigError)
        }
        _ => failure,
    };

    let failure = failure
        .with_metadata(WORKLOAD_ID_KEY, workload.id.as_str())
        .with_metadata(
            TERMINATION_SOURCE_KEY,
            workload
                .termination_source
                .clone()
                .map_or(Value::Null, Value::String),
        );

    match reason {
        Some(reason) => failure.with_internal_message(reason),
        None => failure,
    }
}

fn is_image_pull_failure(reason: &str) -> bool {
    reason.to_lowercase().contains(IMAGE_PULL_FAILURE)
}
