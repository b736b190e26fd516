use std::sync::Mutex;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

/// Label attached to every metric when a connection id is known.
const CONNECTION_LABEL: &str = "connection_id";

/// Interval between two upkeep runs of the Prometheus recorder.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

// A mutex instead of a `OnceLock` because installing the recorder is fallible and
// `OnceLock::get_or_try_init` is unstable.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the global Prometheus recorder and returns a handle to render metrics.
///
/// Installing a recorder is only possible once per process, so later calls return clones of the
/// first handle. Must be called from within a tokio runtime since it spawns the upkeep task.
pub fn init_metrics_handle(connection_id: Option<String>) -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let mut builder = PrometheusBuilder::new();
    if let Some(connection_id) = connection_id {
        builder = builder.add_global_label(CONNECTION_LABEL, connection_id);
    }

    let handle = builder.install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(UPKEEP_INTERVAL).await;
            trace!("running metrics upkeep");
            upkeep_handle.run_upkeep();
        }
    });

    Ok(handle)
}
