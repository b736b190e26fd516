use std::future::Future;

use crate::error::SyncResult;

/// A trait for types that can be started as workers.
///
/// The generic parameter `H` represents the handle type that will be returned when the worker
/// starts, and `S` represents the state type that can be accessed through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type.
    type Error;

    /// Starts the worker and returns a future that resolves to its handle.
    ///
    /// The handle can be used to monitor and control the worker's execution.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker that provides access to its state and completion status.
///
/// The generic parameter `S` represents the type of state that can be accessed through this
/// handle.
pub trait WorkerHandle<S> {
    /// Value the worker produces when it completes.
    type Output;

    /// Returns the current state of the worker.
    ///
    /// The state is a snapshot: it is not tied to the lifetime of the worker and may be stale by
    /// the time it is read.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes.
    fn wait(self) -> impl Future<Output = SyncResult<Self::Output>> + Send;
}
