use tracing::debug;

use crate::context::ReplicationContext;
use crate::error::SyncResult;
use crate::protocol::message::ProtocolMessage;
use crate::protocol::state::StateFamily;
use crate::state::aggregated::AggregatedState;
use crate::state::aggregator::StateAggregator;
use crate::state::injector::MissingStateInjector;

/// Follows the checkpoints of one attempt and produces the checkpoint to persist at its end.
#[derive(Debug)]
pub struct CheckpointTracker {
    aggregator: StateAggregator,
    injector: MissingStateInjector,
    is_reset: bool,
}

impl CheckpointTracker {
    pub fn new(context: &ReplicationContext) -> Self {
        Self {
            aggregator: StateAggregator::new(),
            injector: MissingStateInjector::new(context),
            is_reset: context.is_reset,
        }
    }

    /// Feeds a message read from the source. Messages must be tracked in the order they are read.
    pub fn track(&mut self, message: &ProtocolMessage) -> SyncResult<()> {
        let Some(state) = message.as_state() else {
            return Ok(());
        };

        self.aggregator.ingest(state.clone())?;
        self.injector.track_state(state);

        Ok(())
    }

    /// Returns `true` while no checkpoint was tracked.
    pub fn is_empty(&self) -> bool {
        self.aggregator.is_empty()
    }

    /// Tops up the missing checkpoints and returns the merged result.
    ///
    /// Resets and legacy checkpoints never get synthesized stream checkpoints. Returns [`None`]
    /// when there is nothing to persist.
    pub fn finish(mut self) -> SyncResult<Option<AggregatedState>> {
        if self.is_reset {
            debug!("skipping missing checkpoint injection for a reset attempt");
        } else if self.aggregator.family() == Some(StateFamily::Legacy) {
            debug!("skipping missing checkpoint injection for legacy checkpoints");
        } else {
            for state in self.injector.states_to_inject() {
                self.aggregator.ingest(state)?;
            }
        }

        self.aggregator.aggregated()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::catalog::{
        ConfiguredCatalog, ConfiguredStream, DestinationSyncMode, SyncMode,
    };
    use crate::protocol::state::{GlobalState, StateEnvelope};
    use crate::protocol::stream::StreamDescriptor;
    use crate::state::aggregated::TypedState;

    fn context() -> ReplicationContext {
        ReplicationContext::new(
            Uuid::new_v4(),
            1,
            0,
            Uuid::new_v4(),
            ConfiguredCatalog::new(vec![
                ConfiguredStream::new(
                    StreamDescriptor::new("users"),
                    SyncMode::FullRefresh,
                    DestinationSyncMode::Overwrite,
                ),
                ConfiguredStream::new(
                    StreamDescriptor::new("logs"),
                    SyncMode::Incremental,
                    DestinationSyncMode::Append,
                ),
            ]),
        )
    }

    #[test]
    fn finish_appends_missing_streams_after_seen_ones() {
        let mut tracker = CheckpointTracker::new(&context());
        tracker
            .track(&ProtocolMessage::State(StateEnvelope::stream(
                StreamDescriptor::new("logs"),
                json!({"cursor": 9}),
            )))
            .unwrap();

        let TypedState::Stream(states) = tracker.finish().unwrap().unwrap().typed() else {
            panic!("expected a per-stream checkpoint");
        };

        let names = states
            .iter()
            .filter_map(|state| state.stream_descriptor().map(|d| d.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["logs", "users"]);
    }

    #[test]
    fn reset_does_not_inject() {
        let tracker = CheckpointTracker::new(&context().as_reset());

        assert_eq!(tracker.finish().unwrap(), None);
    }

    #[test]
    fn legacy_checkpoints_are_not_topped_up() {
        let mut tracker = CheckpointTracker::new(&context());
        tracker
            .track(&ProtocolMessage::State(StateEnvelope::legacy(json!({"a": 1}))))
            .unwrap();

        let aggregated = tracker.finish().unwrap().unwrap();
        assert_eq!(aggregated.typed(), TypedState::Legacy(json!({"a": 1})));
    }

    #[test]
    fn mixed_families_fail_while_tracking() {
        let mut tracker = CheckpointTracker::new(&context());
        tracker
            .track(&ProtocolMessage::State(StateEnvelope::legacy(json!({}))))
            .unwrap();

        let err = tracker
            .track(&ProtocolMessage::State(StateEnvelope::global(
                GlobalState::default(),
            )))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);
    }

    #[test]
    fn global_checkpoint_is_kept_as_is() {
        let mut tracker = CheckpointTracker::new(&context());
        tracker
            .track(&ProtocolMessage::State(StateEnvelope::global(
                GlobalState::default(),
            )))
            .unwrap();
        assert!(!tracker.is_empty());

        let aggregated = tracker.finish().unwrap().unwrap();
        assert!(matches!(aggregated.typed(), TypedState::Global(_)));
    }
}
