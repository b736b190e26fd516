//! Tracing and metrics initialization for sync workers.

pub mod metrics;
pub mod tracing;
