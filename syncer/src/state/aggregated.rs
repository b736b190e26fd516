use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::protocol::state::{StateEnvelope, StateFamily};

/// The merged checkpoint of an aggregation session, ready to be persisted.
///
/// Holds either one opaque blob (legacy checkpoints) or a JSON list of checkpoint messages (one
/// global message, or one message per stream). Stats are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedState {
    state: Value,
}

/// Typed view of an [`AggregatedState`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypedState {
    Legacy(Value),
    Global(StateEnvelope),
    Stream(Vec<StateEnvelope>),
}

impl AggregatedState {
    pub fn new(state: Value) -> Self {
        Self { state }
    }

    /// Builds the list form from checkpoint messages, dropping their stats.
    pub fn from_envelopes<I>(envelopes: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = StateEnvelope>,
    {
        let messages = envelopes
            .into_iter()
            .map(|envelope| {
                serde_json::to_value(envelope.without_stats()).map_err(SyncError::serialization)
            })
            .collect::<SyncResult<Vec<_>>>()?;

        Ok(Self::new(Value::Array(messages)))
    }

    pub fn as_value(&self) -> &Value {
        &self.state
    }

    pub fn into_value(self) -> Value {
        self.state
    }

    /// Reads the checkpoint back into its typed form.
    ///
    /// A list starting with a global message is global, a non-empty list of stream messages is
    /// per-stream, anything else is a legacy blob.
    pub fn typed(&self) -> TypedState {
        let Value::Array(items) = &self.state else {
            return TypedState::Legacy(self.state.clone());
        };

        let Ok(envelopes) = items
            .iter()
            .map(|item| serde_json::from_value::<StateEnvelope>(item.clone()))
            .collect::<Result<Vec<_>, _>>()
        else {
            return TypedState::Legacy(self.state.clone());
        };

        match envelopes.as_slice() {
            [first, ..] if first.family() == StateFamily::Global => {
                TypedState::Global(first.clone())
            }
            [_, ..]
                if envelopes
                    .iter()
                    .all(|envelope| envelope.family() == StateFamily::Stream) =>
            {
                TypedState::Stream(envelopes)
            }
            _ => TypedState::Legacy(self.state.clone()),
        }
    }

    /// Returns the family of the checkpoint.
    pub fn family(&self) -> StateFamily {
        match self.typed() {
            TypedState::Legacy(_) => StateFamily::Legacy,
            TypedState::Global(_) => StateFamily::Global,
            TypedState::Stream(_) => StateFamily::Stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::state::GlobalState;
    use crate::protocol::stream::StreamDescriptor;

    #[test]
    fn typed_view_of_stream_list() {
        let state = AggregatedState::from_envelopes([
            StateEnvelope::stream(StreamDescriptor::new("a"), json!({"c": 1})),
            StateEnvelope::stream(StreamDescriptor::new("b"), json!({"c": 2})),
        ])
        .unwrap();

        let TypedState::Stream(envelopes) = state.typed() else {
            panic!("expected a per-stream checkpoint");
        };
        assert_eq!(envelopes.len(), 2);
        assert_eq!(
            envelopes[1].stream_descriptor(),
            Some(&StreamDescriptor::new("b"))
        );
    }

    #[test]
    fn typed_view_of_global_list() {
        let state = AggregatedState::from_envelopes([StateEnvelope::global(GlobalState {
            shared_state: Some(json!({"lsn": 7})),
            stream_states: vec![],
        })])
        .unwrap();

        assert_eq!(state.family(), StateFamily::Global);
    }

    #[test]
    fn arbitrary_blobs_are_legacy() {
        assert_eq!(
            AggregatedState::new(json!({"cursor": 3})).typed(),
            TypedState::Legacy(json!({"cursor": 3}))
        );
        assert_eq!(
            AggregatedState::new(json!([1, 2])).family(),
            StateFamily::Legacy
        );
        assert_eq!(AggregatedState::new(json!([])).family(), StateFamily::Legacy);
    }
}
