//! Checkpoint reconciliation for a replication attempt.
//!
//! Connectors emit checkpoints (state messages) continuously and in one of several encodings. The
//! types in this module merge them into one consistent, resumable checkpoint per logical unit,
//! and synthesize the checkpoints non-resumable streams never emit.

pub mod aggregated;
pub mod aggregator;
pub mod injector;
pub mod tracker;
