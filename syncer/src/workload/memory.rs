use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::workload::api::{CreateWorkloadOutcome, WorkloadApi, WorkloadApiError};
use crate::workload::model::{
    Workload, WorkloadCancelRequest, WorkloadCreateRequest, WorkloadStatus,
};

#[derive(Debug, Default)]
struct Inner {
    workloads: HashMap<String, Workload>,
    create_requests: Vec<WorkloadCreateRequest>,
    cancel_requests: Vec<WorkloadCancelRequest>,
    /// Statuses applied one by one, on each `get`, per workload.
    scripted_statuses: HashMap<String, VecDeque<WorkloadStatus>>,
    create_failures: VecDeque<WorkloadApiError>,
    get_failures: VecDeque<WorkloadApiError>,
    cancel_failures: VecDeque<WorkloadApiError>,
}

/// In-memory control plane.
///
/// Behaves like the real control plane for creation and cancellation, and lets callers script
/// status transitions and failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkloadApi {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWorkloadApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues statuses that successive `get` calls on `workload_id` move the workload through.
    ///
    /// Once the queue is drained, the workload keeps its last status.
    pub async fn script_statuses(&self, workload_id: &str, statuses: Vec<WorkloadStatus>) {
        let mut inner = self.inner.lock().await;
        inner
            .scripted_statuses
            .entry(workload_id.to_owned())
            .or_default()
            .extend(statuses);
    }

    /// Moves a workload to a terminal status with the given termination attribution.
    pub async fn terminate(
        &self,
        workload_id: &str,
        status: WorkloadStatus,
        termination_source: Option<&str>,
        termination_reason: Option<&str>,
    ) {
        let mut inner = self.inner.lock().await;
        if let Some(workload) = inner.workloads.get_mut(workload_id) {
            workload.status = status;
            workload.termination_source = termination_source.map(str::to_owned);
            workload.termination_reason = termination_reason.map(str::to_owned);
        }
    }

    /// Makes the next create calls fail with `errors`, in order.
    pub async fn fail_next_creates(&self, errors: Vec<WorkloadApiError>) {
        self.inner.lock().await.create_failures.extend(errors);
    }

    /// Makes the next get calls fail with `errors`, in order.
    pub async fn fail_next_gets(&self, errors: Vec<WorkloadApiError>) {
        self.inner.lock().await.get_failures.extend(errors);
    }

    /// Makes the next cancel calls fail with `errors`, in order.
    pub async fn fail_next_cancels(&self, errors: Vec<WorkloadApiError>) {
        self.inner.lock().await.cancel_failures.extend(errors);
    }

    pub async fn workload(&self, workload_id: &str) -> Option<Workload> {
        self.inner.lock().await.workloads.get(workload_id).cloned()
    }

    pub async fn workload_count(&self) -> usize {
        self.inner.lock().await.workloads.len()
    }

    pub async fn create_requests(&self) -> Vec<WorkloadCreateRequest> {
        self.inner.lock().await.create_requests.clone()
    }

    pub async fn cancel_requests(&self) -> Vec<WorkloadCancelRequest> {
        self.inner.lock().await.cancel_requests.clone()
    }
}

impl WorkloadApi for MemoryWorkloadApi {
    async fn create(
        &self,
        request: WorkloadCreateRequest,
    ) -> Result<CreateWorkloadOutcome, WorkloadApiError> {
        let mut inner = self.inner.lock().await;
        inner.create_requests.push(request.clone());

        if let Some(err) = inner.create_failures.pop_front() {
            return Err(err);
        }

        if inner.workloads.contains_key(&request.workload_id) {
            return Ok(CreateWorkloadOutcome::AlreadyExists);
        }

        let workload = Workload::pending(&request);
        inner.workloads.insert(request.workload_id, workload);

        Ok(CreateWorkloadOutcome::Created)
    }

    async fn get(&self, workload_id: &str) -> Result<Workload, WorkloadApiError> {
        let mut inner = self.inner.lock().await;

        if let Some(err) = inner.get_failures.pop_front() {
            return Err(err);
        }

        let next_status = inner
            .scripted_statuses
            .get_mut(workload_id)
            .and_then(VecDeque::pop_front);

        let workload = inner
            .workloads
            .get_mut(workload_id)
            .ok_or_else(|| WorkloadApiError::NotFound(workload_id.to_owned()))?;

        if let Some(status) = next_status {
            if !workload.status.is_terminal() {
                workload.status = status;
            }
        }

        Ok(workload.clone())
    }

    async fn cancel(&self, request: WorkloadCancelRequest) -> Result<(), WorkloadApiError> {
        let mut inner = self.inner.lock().await;
        inner.cancel_requests.push(request.clone());

        if let Some(err) = inner.cancel_failures.pop_front() {
            return Err(err);
        }

        let workload = inner
            .workloads
            .get_mut(&request.workload_id)
            .ok_or_else(|| WorkloadApiError::NotFound(request.workload_id.clone()))?;

        if workload.status.is_terminal() {
            return Err(WorkloadApiError::Gone(request.workload_id));
        }

        workload.status = WorkloadStatus::Cancelled;
        workload.termination_source = Some(request.source);
        workload.termination_reason = Some(request.reason);

        Ok(())
    }
}
