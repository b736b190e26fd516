//! Sync execution coordination.
//!
//! Reconciles the checkpoints emitted by a source connector into one resumable checkpoint per
//! logical unit, and drives the remotely scheduled workload running a replication attempt from
//! submission to output.

pub mod concurrency;
pub mod context;
pub mod error;
mod macros;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod state;
pub mod workers;
pub mod workload;
