use serde_json::Value;

use crate::protocol::state::StateEnvelope;
use crate::protocol::stream::StreamDescriptor;

/// A message read from the source during a replication attempt.
///
/// Only checkpoints matter to sync coordination, the other variants are carried so that callers
/// can hand every message to the trackers without filtering first.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    Record {
        stream: StreamDescriptor,
        data: Value,
    },
    State(StateEnvelope),
    Log(String),
    Trace(Value),
}

impl ProtocolMessage {
    /// Returns the checkpoint carried by this message, if any.
    pub fn as_state(&self) -> Option<&StateEnvelope> {
        match self {
            Self::State(state) => Some(state),
            _ => None,
        }
    }
}

impl From<StateEnvelope> for ProtocolMessage {
    fn from(state: StateEnvelope) -> Self {
        Self::State(state)
    }
}
