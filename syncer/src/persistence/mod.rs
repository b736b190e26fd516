//! Durable storage of the checkpoints of a connection.

pub mod api;
pub mod sync_persistence;
