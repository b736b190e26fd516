//! Lifecycle of the remotely scheduled unit of work that runs a replication attempt.

pub mod api;
pub mod client;
pub mod failure;
pub mod memory;
pub mod model;
pub mod output;
