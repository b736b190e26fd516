use std::collections::HashSet;

use metrics::counter;
use serde_json::json;
use tracing::info;

use crate::context::ReplicationContext;
use crate::metrics::SYNC_STATES_INJECTED_TOTAL;
use crate::protocol::catalog::ConfiguredCatalog;
use crate::protocol::message::ProtocolMessage;
use crate::protocol::state::{StateEnvelope, StatePayload};
use crate::protocol::stream::StreamDescriptor;

/// Synthesizes the checkpoints that non-resumable full refresh streams never emit.
///
/// Once the attempt is over, every full refresh stream that cannot checkpoint and did not emit a
/// checkpoint receives an empty one, so that a stateless stream is indistinguishable from one that
/// checkpointed. A single global checkpoint disables injection entirely.
#[derive(Debug)]
pub struct MissingStateInjector {
    catalog: ConfiguredCatalog,
    seen: HashSet<StreamDescriptor>,
    global_seen: bool,
}

impl MissingStateInjector {
    pub fn new(context: &ReplicationContext) -> Self {
        Self::from_catalog(context.catalog.clone())
    }

    pub fn from_catalog(catalog: ConfiguredCatalog) -> Self {
        Self {
            catalog,
            seen: HashSet::new(),
            global_seen: false,
        }
    }

    /// Records which streams checkpointed. Non-checkpoint messages are ignored.
    pub fn track_message(&mut self, message: &ProtocolMessage) {
        if let Some(state) = message.as_state() {
            self.track_state(state);
        }
    }

    pub fn track_state(&mut self, state: &StateEnvelope) {
        match state.payload() {
            StatePayload::Stream(stream) => {
                self.seen.insert(stream.stream_descriptor.clone());
            }
            StatePayload::Global(_) => self.global_seen = true,
            StatePayload::Untyped(_) | StatePayload::Legacy(_) => {}
        }
    }

    /// Returns one empty stream checkpoint per unseen non-resumable full refresh stream, in
    /// catalog order.
    pub fn states_to_inject(&self) -> Vec<StateEnvelope> {
        if self.global_seen {
            return vec![];
        }

        let states = self
            .catalog
            .streams
            .iter()
            .filter(|stream| stream.is_non_resumable_full_refresh())
            .filter(|stream| !self.seen.contains(&stream.stream))
            .map(|stream| StateEnvelope::stream(stream.stream.clone(), json!({})))
            .collect::<Vec<_>>();

        if !states.is_empty() {
            info!(
                count = states.len(),
                "injecting empty checkpoints for non-resumable full refresh streams"
            );
            counter!(SYNC_STATES_INJECTED_TOTAL).increment(states.len() as u64);
        }

        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::catalog::{ConfiguredStream, DestinationSyncMode, SyncMode};
    use crate::protocol::state::GlobalState;

    fn catalog() -> ConfiguredCatalog {
        ConfiguredCatalog::new(vec![
            ConfiguredStream::new(
                StreamDescriptor::new("users"),
                SyncMode::FullRefresh,
                DestinationSyncMode::Overwrite,
            ),
            ConfiguredStream::new(
                StreamDescriptor::new("orders"),
                SyncMode::FullRefresh,
                DestinationSyncMode::Overwrite,
            )
            .with_resumable(false),
            ConfiguredStream::new(
                StreamDescriptor::new("logs"),
                SyncMode::Incremental,
                DestinationSyncMode::Append,
            ),
            ConfiguredStream::new(
                StreamDescriptor::new("events"),
                SyncMode::FullRefresh,
                DestinationSyncMode::Overwrite,
            )
            .with_resumable(true),
        ])
    }

    #[test]
    fn injects_only_unseen_non_resumable_full_refresh_streams() {
        let mut injector = MissingStateInjector::from_catalog(catalog());
        injector.track_message(&ProtocolMessage::Record {
            stream: StreamDescriptor::new("orders"),
            data: json!({}),
        });
        injector.track_message(&ProtocolMessage::State(StateEnvelope::stream(
            StreamDescriptor::new("users"),
            json!({"cursor": 1}),
        )));

        let states = injector.states_to_inject();

        assert_eq!(
            states,
            vec![StateEnvelope::stream(StreamDescriptor::new("orders"), json!({}))]
        );
    }

    #[test]
    fn nothing_seen_injects_every_candidate() {
        let injector = MissingStateInjector::from_catalog(catalog());

        let names = injector
            .states_to_inject()
            .iter()
            .filter_map(|state| state.stream_descriptor().map(|d| d.name.clone()))
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["users", "orders"]);
    }

    #[test]
    fn global_checkpoint_suppresses_injection() {
        let mut injector = MissingStateInjector::from_catalog(catalog());
        injector.track_message(&ProtocolMessage::State(StateEnvelope::global(
            GlobalState::default(),
        )));
        injector.track_message(&ProtocolMessage::State(StateEnvelope::stream(
            StreamDescriptor::new("users"),
            json!({}),
        )));

        assert!(injector.states_to_inject().is_empty());
    }

    #[test]
    fn legacy_checkpoints_do_not_mark_streams() {
        let mut injector = MissingStateInjector::from_catalog(catalog());
        injector.track_message(&ProtocolMessage::State(StateEnvelope::legacy(json!({}))));

        assert_eq!(injector.states_to_inject().len(), 2);
    }
}
