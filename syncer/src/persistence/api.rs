use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::protocol::state::{StateEnvelope, StateFamily};
use crate::state::aggregated::{AggregatedState, TypedState};
use crate::state::aggregator::StateAggregator;

/// Store of the last committed checkpoint of every connection.
pub trait StateApi {
    /// Returns the committed checkpoint of a connection, [`None`] if it never committed one.
    fn get_state(
        &self,
        connection_id: Uuid,
    ) -> impl Future<Output = SyncResult<Option<AggregatedState>>> + Send;

    /// Commits a checkpoint.
    ///
    /// Per-stream checkpoints are upserted stream by stream into the committed ones, any other
    /// checkpoint replaces the committed one.
    fn create_or_update_state(
        &self,
        connection_id: Uuid,
        state: AggregatedState,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<Uuid, AggregatedState>,
    commits: Vec<(Uuid, AggregatedState)>,
    write_failures: VecDeque<SyncError>,
}

/// In-memory state store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateApi {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the committed checkpoint of a connection without recording a commit.
    pub async fn set_state(&self, connection_id: Uuid, state: AggregatedState) {
        let mut inner = self.inner.lock().await;
        inner.states.insert(connection_id, state);
    }

    /// Makes the next commits fail with `errors`, in order.
    pub async fn fail_next_writes(&self, errors: Vec<SyncError>) {
        self.inner.lock().await.write_failures.extend(errors);
    }

    /// Returns every successful commit, in order.
    pub async fn commits(&self) -> Vec<(Uuid, AggregatedState)> {
        self.inner.lock().await.commits.clone()
    }
}

impl StateApi for MemoryStateApi {
    async fn get_state(&self, connection_id: Uuid) -> SyncResult<Option<AggregatedState>> {
        let inner = self.inner.lock().await;

        Ok(inner.states.get(&connection_id).cloned())
    }

    async fn create_or_update_state(
        &self,
        connection_id: Uuid,
        state: AggregatedState,
    ) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;

        if let Some(err) = inner.write_failures.pop_front() {
            return Err(err);
        }

        let merged = match (inner.states.get(&connection_id), state.typed()) {
            (Some(current), TypedState::Stream(updates))
                if current.family() == StateFamily::Stream =>
            {
                upsert_streams(current, updates)?
            }
            _ => state.clone(),
        };

        inner.states.insert(connection_id, merged);
        inner.commits.push((connection_id, state));

        Ok(())
    }
}

fn upsert_streams(
    current: &AggregatedState,
    updates: Vec<StateEnvelope>,
) -> SyncResult<AggregatedState> {
    let mut aggregator = StateAggregator::new();

    if let TypedState::Stream(committed) = current.typed() {
        for envelope in committed {
            aggregator.ingest(envelope)?;
        }
    }
    for envelope in updates {
        aggregator.ingest(envelope)?;
    }

    match aggregator.aggregated()? {
        Some(merged) => Ok(merged),
        None => Ok(current.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::stream::StreamDescriptor;

    fn streams(entries: &[(&str, i64)]) -> AggregatedState {
        AggregatedState::from_envelopes(entries.iter().map(|(name, cursor)| {
            StateEnvelope::stream(StreamDescriptor::new(*name), json!({ "cursor": cursor }))
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn stream_commits_are_upserted() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();

        api.create_or_update_state(connection_id, streams(&[("a", 1), ("b", 1)]))
            .await
            .unwrap();
        api.create_or_update_state(connection_id, streams(&[("b", 2), ("c", 1)]))
            .await
            .unwrap();

        let state = api.get_state(connection_id).await.unwrap().unwrap();
        assert_eq!(state, streams(&[("a", 1), ("b", 2), ("c", 1)]));
        assert_eq!(api.commits().await.len(), 2);
    }

    #[tokio::test]
    async fn other_commits_replace() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();

        api.create_or_update_state(connection_id, streams(&[("a", 1)]))
            .await
            .unwrap();
        api.create_or_update_state(connection_id, AggregatedState::new(json!({"blob": 1})))
            .await
            .unwrap();

        let state = api.get_state(connection_id).await.unwrap().unwrap();
        assert_eq!(state, AggregatedState::new(json!({"blob": 1})));
    }
}
