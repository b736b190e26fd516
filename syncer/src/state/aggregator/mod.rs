use std::fmt;

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::protocol::state::{StateEnvelope, StateFamily};
use crate::state::aggregated::AggregatedState;

mod single;
mod stream;

pub use single::SingleStateAggregator;
pub use stream::StreamStateAggregator;

/// Merge strategy for one checkpoint family.
///
/// Strategies trust the facade to only hand them checkpoints of the family they were chosen for.
pub trait StateStrategy: fmt::Debug + Send + Sync {
    /// Merges one checkpoint into the strategy.
    fn ingest(&mut self, envelope: StateEnvelope);

    /// Returns the merged checkpoint, or [`None`] if nothing was ingested.
    fn aggregated(&self) -> SyncResult<Option<AggregatedState>>;

    fn is_empty(&self) -> bool;

    /// Takes every retained checkpoint out of the strategy, in output order.
    fn drain(&mut self) -> Vec<StateEnvelope>;
}

fn strategy_for(family: StateFamily) -> Box<dyn StateStrategy> {
    match family {
        StateFamily::Stream => Box::new(StreamStateAggregator::default()),
        StateFamily::Legacy | StateFamily::Global => Box::new(SingleStateAggregator::default()),
    }
}

/// Merges the checkpoints of one aggregation session.
///
/// The family of the first ingested checkpoint is latched for the lifetime of the aggregator and
/// selects the merge strategy. Ingesting a checkpoint of another family afterwards fails with
/// [`ErrorKind::StateTypeMismatch`] and leaves the aggregator untouched.
///
/// The aggregator is not synchronized; concurrent producers must merge independently built
/// aggregators with [`StateAggregator::ingest_aggregator`].
#[derive(Debug, Default)]
pub struct StateAggregator {
    family: Option<StateFamily>,
    strategy: Option<Box<dyn StateStrategy>>,
}

impl StateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latched family, [`None`] until the first checkpoint is ingested.
    pub fn family(&self) -> Option<StateFamily> {
        self.family
    }

    /// Ingests one checkpoint.
    pub fn ingest(&mut self, envelope: StateEnvelope) -> SyncResult<()> {
        let strategy = self.latch(envelope.family())?;
        strategy.ingest(envelope);

        Ok(())
    }

    /// Merges every checkpoint of `other` into this aggregator, in `other`'s output order.
    ///
    /// Fails without modifying either side when both aggregators latched different families. An
    /// empty `other` is a no-op.
    pub fn ingest_aggregator(&mut self, mut other: StateAggregator) -> SyncResult<()> {
        let (Some(other_family), Some(other_strategy)) = (other.family, other.strategy.as_mut())
        else {
            return Ok(());
        };

        self.check_mergeable(other_family)?;

        let envelopes = other_strategy.drain();
        debug!(
            count = envelopes.len(),
            family = %other_family,
            "merging checkpoint aggregator"
        );

        let strategy = self.latch(other_family)?;
        for envelope in envelopes {
            strategy.ingest(envelope);
        }

        Ok(())
    }

    /// Checks that `other` can be merged into this aggregator without consuming either side.
    pub fn check_compatible(&self, other: &StateAggregator) -> SyncResult<()> {
        match other.family {
            Some(other_family) => self.check_mergeable(other_family),
            None => Ok(()),
        }
    }

    /// Returns the merged checkpoint with every stats side-channel stripped.
    ///
    /// Returns [`None`] when nothing was ingested.
    pub fn aggregated(&self) -> SyncResult<Option<AggregatedState>> {
        match &self.strategy {
            Some(strategy) => strategy.aggregated(),
            None => Ok(None),
        }
    }

    /// Returns `true` until a checkpoint is ingested, directly or through a merge.
    pub fn is_empty(&self) -> bool {
        self.strategy
            .as_ref()
            .is_none_or(|strategy| strategy.is_empty())
    }

    /// Moves the content of this aggregator into a new one, leaving this one empty and unlatched.
    pub fn take(&mut self) -> StateAggregator {
        std::mem::take(self)
    }

    fn check_mergeable(&self, other_family: StateFamily) -> SyncResult<()> {
        if let Some(family) = self.family {
            if family != other_family {
                bail!(
                    ErrorKind::StateTypeMismatch,
                    "Cannot merge checkpoint aggregators of different families",
                    format!("cannot merge {other_family} checkpoints into {family} checkpoints")
                );
            }
        }

        Ok(())
    }

    fn latch(&mut self, family: StateFamily) -> SyncResult<&mut Box<dyn StateStrategy>> {
        match self.family {
            Some(latched) if latched != family => bail!(
                ErrorKind::StateTypeMismatch,
                "Checkpoint family differs from the family latched by the first checkpoint",
                format!("received a {family} checkpoint after {latched} checkpoints")
            ),
            Some(_) => {}
            None => self.family = Some(family),
        }

        Ok(self.strategy.get_or_insert_with(|| strategy_for(family)))
    }
}
