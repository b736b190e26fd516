use std::future::Future;

use thiserror::Error;

use crate::concurrency::retry::Retryable;
use crate::workload::model::{Workload, WorkloadCancelRequest, WorkloadCreateRequest};

/// Errors returned by the workload control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadApiError {
    #[error("workload {0} already exists")]
    Conflict(String),

    #[error("workload {0} not found")]
    NotFound(String),

    #[error("workload {0} is already in a terminal status")]
    Gone(String),

    #[error("workload control plane unavailable: {0}")]
    Transient(String),

    #[error("workload control plane rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl WorkloadApiError {
    /// Maps an HTTP status code returned by the control plane to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            410 => Self::Gone(message),
            408 | 429 | 500..=599 => Self::Transient(message),
            status => Self::Rejected { status, message },
        }
    }

    /// Returns `true` for failures that may go away when the call is issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Retryable for WorkloadApiError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Result of a create call that reached the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateWorkloadOutcome {
    Created,
    /// A workload with the same id was submitted before.
    AlreadyExists,
}

/// Client of the workload control plane.
///
/// Implementations are expected to be cheap to clone and safe to share between tasks.
pub trait WorkloadApi {
    /// Submits a new workload.
    fn create(
        &self,
        request: WorkloadCreateRequest,
    ) -> impl Future<Output = Result<CreateWorkloadOutcome, WorkloadApiError>> + Send;

    /// Returns the current status of a workload.
    fn get(&self, workload_id: &str)
    -> impl Future<Output = Result<Workload, WorkloadApiError>> + Send;

    /// Requests the cancellation of a workload.
    ///
    /// Fails with [`WorkloadApiError::NotFound`] for unknown workloads and with
    /// [`WorkloadApiError::Gone`] for workloads that already reached a terminal status.
    fn cancel(
        &self,
        request: WorkloadCancelRequest,
    ) -> impl Future<Output = Result<(), WorkloadApiError>> + Send;
}
