use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const SYNC_STATES_BUFFERED_TOTAL: &str = "sync_states_buffered_total";
pub const SYNC_STATE_COMMIT_ATTEMPTS_TOTAL: &str = "sync_state_commit_attempts_total";
pub const SYNC_STATE_COMMIT_FAILURES_TOTAL: &str = "sync_state_commit_failures_total";
pub const SYNC_STATES_INJECTED_TOTAL: &str = "sync_states_injected_total";
pub const SYNC_WORKLOAD_POLLS_TOTAL: &str = "sync_workload_polls_total";
pub const SYNC_API_RETRIES_TOTAL: &str = "sync_api_retries_total";
pub const SYNC_WORKLOAD_TERMINAL_TOTAL: &str = "sync_workload_terminal_total";
pub const SYNC_WORKLOAD_DURATION_SECONDS: &str = "sync_workload_duration_seconds";
pub const STATUS: &str = "status";
pub const OPERATION: &str = "operation";

/// Registers the descriptions of every metric emitted by this crate.
///
/// Safe to call many times, registration only happens once.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            SYNC_STATES_BUFFERED_TOTAL,
            Unit::Count,
            "Checkpoint messages buffered for persistence"
        );

        describe_counter!(
            SYNC_STATE_COMMIT_ATTEMPTS_TOTAL,
            Unit::Count,
            "Attempts to write an aggregated checkpoint to the state API"
        );

        describe_counter!(
            SYNC_STATE_COMMIT_FAILURES_TOTAL,
            Unit::Count,
            "Failed attempts to write an aggregated checkpoint to the state API"
        );

        describe_counter!(
            SYNC_STATES_INJECTED_TOTAL,
            Unit::Count,
            "Empty checkpoints synthesized for non-resumable full refresh streams"
        );

        describe_counter!(
            SYNC_WORKLOAD_POLLS_TOTAL,
            Unit::Count,
            "Status polls issued against the workload control plane"
        );

        describe_counter!(
            SYNC_API_RETRIES_TOTAL,
            Unit::Count,
            "Control plane and state API calls retried after a transient failure"
        );

        describe_counter!(
            SYNC_WORKLOAD_TERMINAL_TOTAL,
            Unit::Count,
            "Workloads observed in a terminal status"
        );

        describe_histogram!(
            SYNC_WORKLOAD_DURATION_SECONDS,
            Unit::Seconds,
            "Time between workload creation and the observation of its terminal status"
        );
    });
}
