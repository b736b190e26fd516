//! Workers running the lifecycle of a replication attempt on their own task.

pub mod base;
pub mod replication;
