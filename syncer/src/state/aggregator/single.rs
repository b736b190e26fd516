use crate::error::SyncResult;
use crate::protocol::state::{StateEnvelope, StatePayload};
use crate::state::aggregated::AggregatedState;
use crate::state::aggregator::StateStrategy;

/// Keeps only the latest whole-connection checkpoint (legacy, untyped or global).
#[derive(Debug, Default)]
pub struct SingleStateAggregator {
    state: Option<StateEnvelope>,
}

impl StateStrategy for SingleStateAggregator {
    fn ingest(&mut self, envelope: StateEnvelope) {
        self.state = Some(envelope);
    }

    fn aggregated(&self) -> SyncResult<Option<AggregatedState>> {
        let Some(state) = &self.state else {
            return Ok(None);
        };

        // Blob checkpoints are persisted as the bare blob, global ones as a one-element list.
        let aggregated = match state.payload() {
            StatePayload::Untyped(data) | StatePayload::Legacy(data) => {
                AggregatedState::new(data.clone())
            }
            StatePayload::Global(_) | StatePayload::Stream(_) => {
                AggregatedState::from_envelopes([state.clone()])?
            }
        };

        Ok(Some(aggregated))
    }

    fn is_empty(&self) -> bool {
        self.state.is_none()
    }

    fn drain(&mut self) -> Vec<StateEnvelope> {
        self.state.take().into_iter().collect()
    }
}
