use std::future;

use tokio::sync::watch;

/// Reason reported when the hosting runtime cancels an attempt without giving one.
pub const DEFAULT_CANCEL_REASON: &str = "Replication cancelled by the platform";
/// Source reported for cancellations issued by the workload worker.
pub const DEFAULT_CANCEL_SOURCE: &str = "workload-api-worker";

/// Why and by whom a running workload is being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub reason: String,
    pub source: String,
}

impl Default for CancelRequest {
    fn default() -> Self {
        Self::new(DEFAULT_CANCEL_REASON, DEFAULT_CANCEL_SOURCE)
    }
}

impl CancelRequest {
    pub fn new(reason: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: source.into(),
        }
    }
}

/// Sending half of a cancellation channel, held by the hosting runtime.
#[derive(Debug, Clone)]
pub struct CancelTx(watch::Sender<Option<CancelRequest>>);

impl CancelTx {
    /// Signals cancellation to every subscriber.
    ///
    /// Only the first request is kept, later ones are ignored so that the reason reported to the
    /// control plane is the one that actually triggered the cancellation.
    pub fn cancel(&self, request: CancelRequest) {
        self.0.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }

            *current = Some(request);
            true
        });
    }

    pub fn subscribe(&self) -> CancelRx {
        CancelRx(self.0.subscribe())
    }
}

/// Receiving half of a cancellation channel, checked by the poll loop between two polls.
#[derive(Debug, Clone)]
pub struct CancelRx(watch::Receiver<Option<CancelRequest>>);

impl CancelRx {
    /// Returns the cancellation request if one was already signalled.
    pub fn request(&self) -> Option<CancelRequest> {
        self.0.borrow().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Resolves once cancellation is signalled.
    ///
    /// If every sender is dropped without cancelling, the future never resolves: nobody is left
    /// who could cancel.
    pub async fn cancelled(&mut self) -> CancelRequest {
        // The borrow guard must not live across the pending await below.
        let request = self
            .0
            .wait_for(Option::is_some)
            .await
            .map(|request| Option::clone(&request));

        match request {
            Ok(Some(request)) => request,
            Ok(None) => CancelRequest::default(),
            Err(_) => future::pending().await,
        }
    }
}

/// Creates a new cancellation channel with no request signalled.
pub fn create_cancel_channel() -> (CancelTx, CancelRx) {
    let (tx, rx) = watch::channel(None);
    (CancelTx(tx), CancelRx(rx))
}
