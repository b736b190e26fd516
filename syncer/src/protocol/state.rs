use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::protocol::stream::StreamDescriptor;

/// Checkpoint type tag as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Legacy,
    Global,
    Stream,
}

/// Checkpoint of a single stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    pub stream_descriptor: StreamDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_state: Option<Value>,
}

/// Checkpoint shared by all streams of a connection, plus the per-stream sub-states.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_state: Option<Value>,
    #[serde(default)]
    pub stream_states: Vec<StreamState>,
}

/// In-flight counters attached to a checkpoint.
///
/// Stats are bookkeeping for the running sync only. They are never part of a durable checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<f64>,
}

/// Raw wire form of a checkpoint message.
///
/// Every field is optional on the wire, [`StateEnvelope`] is the validated form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub state_type: Option<StateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_stats: Option<StateStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_stats: Option<StateStats>,
}

/// Body of a checkpoint, one variant per encoding connectors use.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    /// Pre-typed checkpoint: an opaque blob without a `type` tag.
    Untyped(Value),
    /// Explicitly tagged, still a single opaque blob.
    Legacy(Value),
    /// Shared state plus ordered per-stream sub-states.
    Global(GlobalState),
    /// Checkpoint of exactly one stream.
    Stream(StreamState),
}

/// Compatibility class of checkpoints.
///
/// All checkpoints ingested during one aggregation session must belong to the same family.
/// `LEGACY` and untyped checkpoints are interchangeable and form one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFamily {
    Legacy,
    Global,
    Stream,
}

impl fmt::Display for StateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Global => write!(f, "global"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

/// A validated checkpoint message.
///
/// Serializes to and from the protocol shape through [`StateMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateMessage", into = "StateMessage")]
pub struct StateEnvelope {
    payload: StatePayload,
    source_stats: Option<StateStats>,
    destination_stats: Option<StateStats>,
}

impl StateEnvelope {
    pub fn new(payload: StatePayload) -> Self {
        Self {
            payload,
            source_stats: None,
            destination_stats: None,
        }
    }

    pub fn untyped(data: Value) -> Self {
        Self::new(StatePayload::Untyped(data))
    }

    pub fn legacy(data: Value) -> Self {
        Self::new(StatePayload::Legacy(data))
    }

    pub fn global(global: GlobalState) -> Self {
        Self::new(StatePayload::Global(global))
    }

    pub fn stream(stream_descriptor: StreamDescriptor, stream_state: Value) -> Self {
        Self::new(StatePayload::Stream(StreamState {
            stream_descriptor,
            stream_state: Some(stream_state),
        }))
    }

    pub fn with_source_stats(mut self, stats: StateStats) -> Self {
        self.source_stats = Some(stats);
        self
    }

    pub fn with_destination_stats(mut self, stats: StateStats) -> Self {
        self.destination_stats = Some(stats);
        self
    }

    pub fn payload(&self) -> &StatePayload {
        &self.payload
    }

    pub fn source_stats(&self) -> Option<&StateStats> {
        self.source_stats.as_ref()
    }

    pub fn destination_stats(&self) -> Option<&StateStats> {
        self.destination_stats.as_ref()
    }

    /// Returns `true` if any stats are attached to this checkpoint.
    pub fn has_stats(&self) -> bool {
        self.source_stats.is_some() || self.destination_stats.is_some()
    }

    /// Returns the wire tag, [`None`] for untyped checkpoints.
    pub fn state_type(&self) -> Option<StateType> {
        match self.payload {
            StatePayload::Untyped(_) => None,
            StatePayload::Legacy(_) => Some(StateType::Legacy),
            StatePayload::Global(_) => Some(StateType::Global),
            StatePayload::Stream(_) => Some(StateType::Stream),
        }
    }

    pub fn family(&self) -> StateFamily {
        match self.payload {
            StatePayload::Untyped(_) | StatePayload::Legacy(_) => StateFamily::Legacy,
            StatePayload::Global(_) => StateFamily::Global,
            StatePayload::Stream(_) => StateFamily::Stream,
        }
    }

    /// Returns the stream this checkpoint belongs to, for per-stream checkpoints only.
    pub fn stream_descriptor(&self) -> Option<&StreamDescriptor> {
        match &self.payload {
            StatePayload::Stream(stream) => Some(&stream.stream_descriptor),
            _ => None,
        }
    }

    /// Drops the in-flight stats, leaving only what belongs in a durable checkpoint.
    pub fn without_stats(mut self) -> Self {
        self.source_stats = None;
        self.destination_stats = None;
        self
    }
}

impl TryFrom<StateMessage> for StateEnvelope {
    type Error = SyncError;

    fn try_from(message: StateMessage) -> SyncResult<Self> {
        let payload = match message.state_type {
            None => StatePayload::Untyped(message.data.unwrap_or(Value::Null)),
            Some(StateType::Legacy) => StatePayload::Legacy(message.data.unwrap_or(Value::Null)),
            Some(StateType::Global) => match message.global {
                Some(global) => StatePayload::Global(global),
                None => bail!(
                    ErrorKind::InvalidStateMessage,
                    "GLOBAL state message without a global state"
                ),
            },
            Some(StateType::Stream) => match message.stream {
                Some(stream) => StatePayload::Stream(stream),
                None => bail!(
                    ErrorKind::InvalidStateMessage,
                    "STREAM state message without a stream state"
                ),
            },
        };

        Ok(Self {
            payload,
            source_stats: message.source_stats,
            destination_stats: message.destination_stats,
        })
    }
}

impl From<StateEnvelope> for StateMessage {
    fn from(envelope: StateEnvelope) -> Self {
        let mut message = StateMessage {
            source_stats: envelope.source_stats,
            destination_stats: envelope.destination_stats,
            ..Default::default()
        };

        match envelope.payload {
            StatePayload::Untyped(data) => message.data = Some(data),
            StatePayload::Legacy(data) => {
                message.state_type = Some(StateType::Legacy);
                message.data = Some(data);
            }
            StatePayload::Global(global) => {
                message.state_type = Some(StateType::Global);
                message.global = Some(global);
            }
            StatePayload::Stream(stream) => {
                message.state_type = Some(StateType::Stream);
                message.stream = Some(stream);
            }
        }

        message
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_stream_message_with_stats() {
        let envelope: StateEnvelope = serde_json::from_value(json!({
            "type": "STREAM",
            "stream": {
                "streamDescriptor": {"name": "users", "namespace": "public"},
                "streamState": {"cursor": 10}
            },
            "destinationStats": {"recordCount": 42.0}
        }))
        .unwrap();

        assert_eq!(envelope.family(), StateFamily::Stream);
        assert_eq!(
            envelope.stream_descriptor(),
            Some(&StreamDescriptor::with_namespace("users", "public"))
        );
        assert_eq!(
            envelope.destination_stats().and_then(|stats| stats.record_count),
            Some(42.0)
        );
    }

    #[test]
    fn missing_type_is_untyped_and_shares_the_legacy_family() {
        let untyped: StateEnvelope = serde_json::from_value(json!({"data": {"a": 1}})).unwrap();
        let legacy: StateEnvelope =
            serde_json::from_value(json!({"type": "LEGACY", "data": {"a": 1}})).unwrap();

        assert_eq!(untyped.state_type(), None);
        assert_eq!(untyped.family(), StateFamily::Legacy);
        assert_eq!(legacy.family(), StateFamily::Legacy);
    }

    #[test]
    fn typed_message_without_body_is_rejected() {
        let result = serde_json::from_value::<StateEnvelope>(json!({"type": "GLOBAL"}));
        assert!(result.is_err());

        let message = StateMessage {
            state_type: Some(StateType::Stream),
            ..Default::default()
        };
        let err = StateEnvelope::try_from(message).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateMessage);
    }

    #[test]
    fn without_stats_drops_side_channel_on_the_wire() {
        let envelope = StateEnvelope::legacy(json!({"cursor": 1}))
            .with_source_stats(StateStats {
                record_count: Some(3.0),
            })
            .without_stats();

        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json, json!({"type": "LEGACY", "data": {"cursor": 1}}));
    }
}
