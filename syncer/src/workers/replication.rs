use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

use crate::concurrency::cancel::{CancelRequest, CancelRx, CancelTx, create_cancel_channel};
use crate::context::ReplicationContext;
use crate::error::SyncResult;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workload::api::WorkloadApi;
use crate::workload::client::WorkloadClient;
use crate::workload::model::{
    WorkloadCreateRequest, WorkloadLabel, WorkloadType, sync_workload_id,
};
use crate::workload::output::{OutputStore, ReplicationOutput};

const CONNECTION_ID_LABEL: &str = "connection_id";
const JOB_ID_LABEL: &str = "job_id";
const ATTEMPT_NUMBER_LABEL: &str = "attempt_number";
const WORKSPACE_ID_LABEL: &str = "workspace_id";
const WORKLOAD_TYPE_LABEL: &str = "workload_type";

/// Where a replication worker is in the lifecycle of its workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPhase {
    Creating,
    Waiting,
    ReadingOutput,
    Completed,
    Cancelled,
    Failed,
}

impl ReplicationPhase {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Runs a replication attempt as a workload of the control plane.
///
/// Starting the worker submits the workload, polls it until it is terminal and reads its output
/// on a dedicated task.
#[derive(Debug)]
pub struct WorkloadApiWorker<A, O> {
    context: ReplicationContext,
    client: WorkloadClient<A, O>,
    input: Value,
}

impl<A, O> WorkloadApiWorker<A, O>
where
    A: WorkloadApi,
    O: OutputStore,
{
    /// Creates a worker submitting `input` as the opaque input of the workload.
    pub fn new(context: ReplicationContext, client: WorkloadClient<A, O>, input: Value) -> Self {
        Self {
            context,
            client,
            input,
        }
    }

    pub fn workload_id(&self) -> String {
        sync_workload_id(
            self.context.connection_id,
            self.context.job_id,
            self.context.attempt_number,
        )
    }

    /// Builds the request submitting the workload of this attempt.
    ///
    /// The connection id is the mutex key, so the control plane runs at most one workload per
    /// connection at a time.
    pub fn create_request(&self) -> WorkloadCreateRequest {
        let context = &self.context;
        let config = self.client.config();

        let labels = vec![
            WorkloadLabel::new(CONNECTION_ID_LABEL, context.connection_id),
            WorkloadLabel::new(JOB_ID_LABEL, context.job_id),
            WorkloadLabel::new(ATTEMPT_NUMBER_LABEL, context.attempt_number),
            WorkloadLabel::new(WORKSPACE_ID_LABEL, context.workspace_id),
            WorkloadLabel::new(WORKLOAD_TYPE_LABEL, WorkloadType::Sync.as_str()),
        ];

        let log_path = format!(
            "{}/{}/{}/{}/{}",
            config.log_path_prefix.trim_end_matches('/'),
            context.workspace_id,
            context.connection_id,
            context.job_id,
            context.attempt_number
        );

        let deadline = config
            .deadline_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(TimeDelta::try_seconds)
            .and_then(|timeout| Utc::now().checked_add_signed(timeout));

        WorkloadCreateRequest {
            workload_id: self.workload_id(),
            labels,
            workload_input: self.input.clone(),
            log_path,
            workload_type: WorkloadType::Sync,
            priority: config.priority.into(),
            workspace_id: context.workspace_id,
            organization_id: context.organization_id,
            mutex_key: Some(context.connection_id.to_string()),
            dataplane_group: config.dataplane_group.clone(),
            deadline,
        }
    }

    /// Submits the workload of this attempt. Resubmitting an existing workload is not an error.
    pub async fn create_workload(&self) -> SyncResult<String> {
        let request = self.create_request();
        let workload_id = request.workload_id.clone();
        self.client.create_workload(request).await?;

        Ok(workload_id)
    }

    async fn run(
        self,
        mut cancel_rx: CancelRx,
        phase_tx: watch::Sender<ReplicationPhase>,
    ) -> SyncResult<ReplicationOutput> {
        let result = self.run_lifecycle(&mut cancel_rx, &phase_tx).await;

        let phase = match &result {
            Ok(_) => ReplicationPhase::Completed,
            Err(err) if err.is_cancellation() => ReplicationPhase::Cancelled,
            Err(_) => ReplicationPhase::Failed,
        };
        phase_tx.send_replace(phase);

        match &result {
            Ok(output) => info!(status = ?output.status, "replication worker completed"),
            Err(err) if err.is_cancellation() => info!("replication worker cancelled"),
            Err(err) => error!(error = %err, "replication worker failed"),
        }

        result
    }

    async fn run_lifecycle(
        &self,
        cancel_rx: &mut CancelRx,
        phase_tx: &watch::Sender<ReplicationPhase>,
    ) -> SyncResult<ReplicationOutput> {
        // The create call may already have reached the control plane, cancel remotely either way.
        let workload_id = tokio::select! {
            biased;

            request = cancel_rx.cancelled() => {
                return self.client.cancel_on_signal(&self.workload_id(), request).await;
            }
            workload_id = self.create_workload() => workload_id?,
        };

        phase_tx.send_replace(ReplicationPhase::Waiting);
        self.client.wait_for_workload(&workload_id, cancel_rx).await?;

        phase_tx.send_replace(ReplicationPhase::ReadingOutput);
        self.client.get_output(&workload_id).await
    }
}

impl<A, O> Worker<WorkloadApiWorkerHandle, ReplicationPhase> for WorkloadApiWorker<A, O>
where
    A: WorkloadApi + Send + Sync + 'static,
    O: OutputStore + Send + Sync + 'static,
{
    type Error = std::convert::Infallible;

    async fn start(self) -> Result<WorkloadApiWorkerHandle, Self::Error> {
        let workload_id = self.workload_id();
        info!(%workload_id, "starting replication worker");

        let (cancel_tx, cancel_rx) = create_cancel_channel();
        let (phase_tx, phase_rx) = watch::channel(ReplicationPhase::Creating);

        let span = tracing::info_span!(
            "replication_worker",
            workload_id = %workload_id,
            connection_id = %self.context.connection_id,
            job_id = self.context.job_id,
            attempt_number = self.context.attempt_number,
        );
        let handle = tokio::spawn(self.run(cancel_rx, phase_tx).instrument(span));

        Ok(WorkloadApiWorkerHandle {
            workload_id,
            handle,
            cancel_tx,
            phase_rx,
        })
    }
}

/// Handle of a running [`WorkloadApiWorker`].
#[derive(Debug)]
pub struct WorkloadApiWorkerHandle {
    workload_id: String,
    handle: JoinHandle<SyncResult<ReplicationOutput>>,
    cancel_tx: CancelTx,
    phase_rx: watch::Receiver<ReplicationPhase>,
}

impl WorkloadApiWorkerHandle {
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    /// Signals cancellation to the worker, which cancels its workload on a best-effort basis.
    pub fn cancel(&self, request: CancelRequest) {
        self.cancel_tx.cancel(request);
    }

    /// Returns a sender the hosting runtime can use to cancel the worker, e.g. from a heartbeat
    /// callback.
    pub fn cancel_tx(&self) -> CancelTx {
        self.cancel_tx.clone()
    }
}

impl WorkerHandle<ReplicationPhase> for WorkloadApiWorkerHandle {
    type Output = ReplicationOutput;

    fn state(&self) -> ReplicationPhase {
        *self.phase_rx.borrow()
    }

    async fn wait(self) -> SyncResult<ReplicationOutput> {
        self.handle.await?
    }
}
