use std::collections::HashMap;

use crate::error::SyncResult;
use crate::protocol::state::StateEnvelope;
use crate::protocol::stream::StreamDescriptor;
use crate::state::aggregated::AggregatedState;
use crate::state::aggregator::StateStrategy;

/// Keeps the latest checkpoint of every stream, in the order streams were first seen.
#[derive(Debug, Default)]
pub struct StreamStateAggregator {
    states: Vec<StateEnvelope>,
    positions: HashMap<StreamDescriptor, usize>,
}

impl StateStrategy for StreamStateAggregator {
    fn ingest(&mut self, envelope: StateEnvelope) {
        let Some(descriptor) = envelope.stream_descriptor().cloned() else {
            return;
        };

        match self.positions.get(&descriptor) {
            Some(&position) => self.states[position] = envelope,
            None => {
                self.positions.insert(descriptor, self.states.len());
                self.states.push(envelope);
            }
        }
    }

    fn aggregated(&self) -> SyncResult<Option<AggregatedState>> {
        if self.states.is_empty() {
            return Ok(None);
        }

        AggregatedState::from_envelopes(self.states.iter().cloned()).map(Some)
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn drain(&mut self) -> Vec<StateEnvelope> {
        self.positions.clear();
        std::mem::take(&mut self.states)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::state::StateStats;
    use crate::state::aggregated::TypedState;

    fn names(aggregated: &AggregatedState) -> Vec<(String, i64)> {
        let TypedState::Stream(envelopes) = aggregated.typed() else {
            panic!("expected a per-stream checkpoint");
        };

        envelopes
            .iter()
            .map(|envelope| {
                let serialized = serde_json::to_value(envelope).unwrap();
                (
                    serialized["stream"]["streamDescriptor"]["name"]
                        .as_str()
                        .unwrap()
                        .to_owned(),
                    serialized["stream"]["streamState"]["cursor"]
                        .as_i64()
                        .unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn updates_in_place_and_keeps_first_seen_order() {
        let mut aggregator = StreamStateAggregator::default();
        aggregator.ingest(StateEnvelope::stream(
            StreamDescriptor::new("a"),
            json!({"cursor": 1}),
        ));
        aggregator.ingest(StateEnvelope::stream(
            StreamDescriptor::new("b"),
            json!({"cursor": 1}),
        ));
        aggregator.ingest(StateEnvelope::stream(
            StreamDescriptor::new("a"),
            json!({"cursor": 2}),
        ));

        let aggregated = aggregator.aggregated().unwrap().unwrap();

        assert_eq!(
            names(&aggregated),
            vec![("a".to_owned(), 2), ("b".to_owned(), 1)]
        );
    }

    #[test]
    fn namespace_is_part_of_the_identity() {
        let mut aggregator = StreamStateAggregator::default();
        aggregator.ingest(StateEnvelope::stream(
            StreamDescriptor::new("users"),
            json!({"cursor": 1}),
        ));
        aggregator.ingest(StateEnvelope::stream(
            StreamDescriptor::with_namespace("users", "public"),
            json!({"cursor": 2}),
        ));

        assert_eq!(aggregator.drain().len(), 2);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn output_strips_stats() {
        let mut aggregator = StreamStateAggregator::default();
        aggregator.ingest(
            StateEnvelope::stream(StreamDescriptor::new("a"), json!({"cursor": 1}))
                .with_source_stats(StateStats {
                    record_count: Some(5.0),
                }),
        );

        let aggregated = aggregator.aggregated().unwrap().unwrap();

        assert!(aggregated.as_value()[0].get("sourceStats").is_none());
    }
}
