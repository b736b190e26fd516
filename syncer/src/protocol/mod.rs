//! Protocol types consumed by checkpoint aggregation.
//!
//! These mirror the wire shape connectors emit: stream descriptors, checkpoint (state) messages
//! and the configured catalog of the attempt.

pub mod catalog;
pub mod message;
pub mod state;
pub mod stream;
