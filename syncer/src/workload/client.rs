use metrics::{counter, histogram};
use serde_json::Value;
use syncer_config::shared::WorkloadConfig;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::concurrency::cancel::{CancelRequest, CancelRx};
use crate::concurrency::retry::retry_with_budget;
use crate::error::{ErrorKind, SyncResult};
use crate::metrics::{
    STATUS, SYNC_WORKLOAD_DURATION_SECONDS, SYNC_WORKLOAD_POLLS_TOTAL,
    SYNC_WORKLOAD_TERMINAL_TOTAL, register_metrics,
};
use crate::sync_error;
use crate::workload::api::{CreateWorkloadOutcome, WorkloadApi, WorkloadApiError};
use crate::workload::failure::classify_missing_output;
use crate::workload::model::{
    Workload, WorkloadCancelRequest, WorkloadCreateRequest, WorkloadStatus,
};
use crate::workload::output::{OutputStore, ReplicationOutput};

/// Drives a workload through its lifecycle against the control plane.
///
/// The client never changes the status of a workload itself. It submits, polls and cancels, and
/// reads the output once the control plane reports a terminal status. Every control plane call is
/// retried on transient failures for at most the configured retry budget.
#[derive(Debug, Clone)]
pub struct WorkloadClient<A, O> {
    api: A,
    outputs: O,
    config: WorkloadConfig,
}

impl<A, O> WorkloadClient<A, O>
where
    A: WorkloadApi,
    O: OutputStore,
{
    pub fn new(api: A, outputs: O, config: WorkloadConfig) -> Self {
        register_metrics();

        Self {
            api,
            outputs,
            config,
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Submits a workload.
    ///
    /// A workload that already exists is not an error, so resubmitting an attempt is idempotent.
    pub async fn create_workload(&self, request: WorkloadCreateRequest) -> SyncResult<()> {
        let workload_id = request.workload_id.clone();

        let outcome = retry_with_budget(&self.config.api_retry, "create_workload", || {
            self.api.create(request.clone())
        })
        .await;

        match outcome {
            Ok(CreateWorkloadOutcome::Created) => {
                info!(%workload_id, "workload created");
            }
            Ok(CreateWorkloadOutcome::AlreadyExists) | Err(WorkloadApiError::Conflict(_)) => {
                info!(%workload_id, "workload already exists, continuing with it");
            }
            Err(err) => {
                error!(%workload_id, error = %err, "failed to create workload");

                return Err(sync_error!(
                    ErrorKind::WorkloadCreateFailed,
                    "Failed to create workload",
                    format!("workload_id={workload_id}: {err}")
                ));
            }
        }

        Ok(())
    }

    /// Returns the workload as currently reported by the control plane.
    pub async fn get_workload(&self, workload_id: &str) -> SyncResult<Workload> {
        let workload = retry_with_budget(&self.config.api_retry, "get_workload", || {
            self.api.get(workload_id)
        })
        .await?;

        Ok(workload)
    }

    /// Polls a workload until it reaches a terminal status.
    ///
    /// Returns the workload when it succeeded or failed. A cancelled workload, or a cancellation
    /// signalled through `cancel_rx` while polling, ends with an [`ErrorKind::WorkloadCancelled`]
    /// error. In the latter case the workload is cancelled remotely on a best-effort basis first.
    pub async fn wait_for_workload(
        &self,
        workload_id: &str,
        cancel_rx: &mut CancelRx,
    ) -> SyncResult<Workload> {
        let started = Instant::now();

        loop {
            let workload = tokio::select! {
                biased;

                request = cancel_rx.cancelled() => {
                    return self.cancel_on_signal(workload_id, request).await;
                }
                workload = self.get_workload(workload_id) => workload?,
            };
            counter!(SYNC_WORKLOAD_POLLS_TOTAL).increment(1);

            if workload.status.is_terminal() {
                counter!(SYNC_WORKLOAD_TERMINAL_TOTAL, STATUS => workload.status.as_str())
                    .increment(1);
                histogram!(SYNC_WORKLOAD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

                if workload.status == WorkloadStatus::Cancelled {
                    info!(
                        %workload_id,
                        termination_source = workload.termination_source.as_deref(),
                        "workload was cancelled"
                    );

                    return Err(sync_error!(
                        ErrorKind::WorkloadCancelled,
                        "Workload was cancelled",
                        format!(
                            "workload_id={workload_id}, reason={}",
                            workload.termination_reason.as_deref().unwrap_or("unknown")
                        )
                    ));
                }

                info!(%workload_id, status = %workload.status, "workload reached a terminal status");

                return Ok(workload);
            }

            debug!(%workload_id, status = %workload.status, "workload not terminal yet");

            tokio::select! {
                biased;

                request = cancel_rx.cancelled() => {
                    return self.cancel_on_signal(workload_id, request).await;
                }
                _ = sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Requests the cancellation of a workload.
    ///
    /// Workloads that do not exist yet or already reached a terminal status are left alone: both
    /// are expected when cancellation races with creation or completion.
    pub async fn cancel(&self, request: WorkloadCancelRequest) -> SyncResult<()> {
        let workload_id = request.workload_id.clone();

        let result = retry_with_budget(&self.config.api_retry, "cancel_workload", || {
            self.api.cancel(request.clone())
        })
        .await;

        match result {
            Ok(()) => {
                info!(%workload_id, reason = %request.reason, "workload cancellation requested");
                Ok(())
            }
            Err(WorkloadApiError::NotFound(_)) => {
                info!(%workload_id, "workload to cancel does not exist, ignoring");
                Ok(())
            }
            Err(WorkloadApiError::Gone(_)) => {
                info!(%workload_id, "workload to cancel is already terminal, ignoring");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the output of a terminal workload.
    ///
    /// When no readable output exists, an output carrying the classified failure of the workload
    /// is returned instead.
    pub async fn get_output(&self, workload_id: &str) -> SyncResult<ReplicationOutput> {
        let raw = match self.outputs.read(workload_id).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%workload_id, error = %err, "failed to read workload output");
                None
            }
        };

        if let Some(output) = raw.and_then(|raw| parse_output(workload_id, raw)) {
            return Ok(output);
        }

        let workload = self.get_workload(workload_id).await?;
        let failure = classify_missing_output(&workload);
        warn!(
            %workload_id,
            status = %workload.status,
            origin = ?failure.failure_origin,
            "workload output is missing, reporting a failure"
        );

        Ok(match workload.status {
            WorkloadStatus::Cancelled => ReplicationOutput::cancelled(failure),
            _ => ReplicationOutput::failed(failure),
        })
    }

    /// Cancels a workload on behalf of a cancellation signal and returns the cancellation error.
    ///
    /// The remote cancellation is best-effort: its failure is logged and the cancellation error is
    /// returned regardless.
    pub async fn cancel_on_signal<T>(
        &self,
        workload_id: &str,
        request: CancelRequest,
    ) -> SyncResult<T> {
        info!(
            %workload_id,
            reason = %request.reason,
            source = %request.source,
            "cancellation signalled, cancelling workload"
        );

        let cancel_request = WorkloadCancelRequest {
            workload_id: workload_id.to_owned(),
            reason: request.reason.clone(),
            source: request.source,
        };
        if let Err(err) = self.cancel(cancel_request).await {
            warn!(%workload_id, error = %err, "best-effort workload cancellation failed");
        }

        Err(sync_error!(
            ErrorKind::WorkloadCancelled,
            "Workload cancelled by the hosting runtime",
            format!("workload_id={workload_id}, reason={}", request.reason)
        ))
    }
}

fn parse_output(workload_id: &str, raw: Value) -> Option<ReplicationOutput> {
    match serde_json::from_value(raw) {
        Ok(output) => Some(output),
        Err(err) => {
            warn!(%workload_id, error = %err, "workload output is unreadable");
            None
        }
    }
}
