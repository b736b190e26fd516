use metrics::counter;
use syncer_config::shared::StateFlushConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bail;
use crate::concurrency::retry::{Retryable, retry_with_budget};
use crate::error::{ErrorKind, SyncResult};
use crate::metrics::{
    SYNC_STATE_COMMIT_ATTEMPTS_TOTAL, SYNC_STATE_COMMIT_FAILURES_TOTAL,
    SYNC_STATES_BUFFERED_TOTAL, register_metrics,
};
use crate::persistence::api::StateApi;
use crate::protocol::state::{StateEnvelope, StateFamily};
use crate::state::aggregated::AggregatedState;
use crate::state::aggregator::StateAggregator;
use crate::sync_error;

/// Buffers the checkpoints of a running attempt and commits them periodically.
///
/// Checkpoints are aggregated into a buffer. Every flush period the buffer is rolled over into
/// the checkpoint waiting to be committed, merging with it if the previous commit failed, so that
/// a failed commit is retried by the next flush with everything received since. A failed periodic
/// commit is logged and never fails the attempt, only [`SyncPersistence::close`] escalates.
#[derive(Debug)]
pub struct SyncPersistence<S> {
    connection_id: Uuid,
    state_api: S,
    config: StateFlushConfig,
    buffer: StateAggregator,
    to_commit: StateAggregator,
    /// Family of the first checkpoint of the session, kept across flushes.
    family: Option<StateFamily>,
    last_flush: Instant,
    migration_checked: bool,
    /// Set while migrating from a legacy to a per-stream checkpoint, which must be committed at
    /// once.
    flush_only_on_close: bool,
}

impl<S> SyncPersistence<S>
where
    S: StateApi,
{
    pub fn new(connection_id: Uuid, state_api: S, config: StateFlushConfig) -> Self {
        register_metrics();

        Self {
            connection_id,
            state_api,
            config,
            buffer: StateAggregator::new(),
            to_commit: StateAggregator::new(),
            family: None,
            last_flush: Instant::now(),
            migration_checked: false,
            flush_only_on_close: false,
        }
    }

    /// Buffers a checkpoint of `connection_id` and flushes if the flush period elapsed.
    pub async fn persist(&mut self, connection_id: Uuid, envelope: StateEnvelope) -> SyncResult<()> {
        if connection_id != self.connection_id {
            bail!(
                ErrorKind::InvalidState,
                "Checkpoint received for another connection",
                format!(
                    "expected connection {}, got {connection_id}",
                    self.connection_id
                )
            );
        }

        let family = envelope.family();
        self.check_family(family)?;

        if !self.migration_checked {
            self.check_migration(&envelope).await?;
        }

        self.buffer.ingest(envelope)?;
        self.family = Some(family);
        counter!(SYNC_STATES_BUFFERED_TOTAL).increment(1);

        if !self.flush_only_on_close && self.last_flush.elapsed() >= self.config.flush_period() {
            match self.flush().await {
                Ok(()) => {}
                Err(err) if err.is_retryable() => {
                    warn!(
                        connection_id = %self.connection_id,
                        error = %err,
                        "periodic checkpoint flush failed, retrying on the next flush"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Returns `true` while checkpoints are buffered or waiting for a commit.
    pub fn has_pending_state(&self) -> bool {
        !self.buffer.is_empty() || !self.to_commit.is_empty()
    }

    /// Commits everything received so far once.
    pub async fn flush(&mut self) -> SyncResult<()> {
        self.roll_buffer()?;
        self.last_flush = Instant::now();

        let Some(state) = self.to_commit.aggregated()? else {
            return Ok(());
        };

        commit(&self.state_api, self.connection_id, state).await?;
        self.to_commit = StateAggregator::new();

        Ok(())
    }

    /// Commits everything received so far, retrying for at most the final flush budget.
    ///
    /// Fails with [`ErrorKind::StatePersistenceFailed`] when the checkpoint could not be
    /// committed.
    pub async fn close(mut self) -> SyncResult<()> {
        self.roll_buffer()?;

        let Some(state) = self.to_commit.aggregated()? else {
            debug!(connection_id = %self.connection_id, "no checkpoint to commit on close");
            return Ok(());
        };

        let state_api = &self.state_api;
        let connection_id = self.connection_id;
        retry_with_budget(&self.config.final_flush_retry, "final_state_flush", || {
            commit(state_api, connection_id, state.clone())
        })
        .await
        .map_err(|err| {
            sync_error!(
                ErrorKind::StatePersistenceFailed,
                "Failed to commit the final checkpoint",
                format!("connection_id={connection_id}: {err}")
            )
        })?;

        info!(%connection_id, "final checkpoint committed");

        Ok(())
    }

    /// Moves the buffer into the checkpoint waiting to be committed. Newer checkpoints win.
    ///
    /// The buffer is left untouched when it cannot be merged.
    fn roll_buffer(&mut self) -> SyncResult<()> {
        if self.to_commit.is_empty() {
            self.to_commit = self.buffer.take();
            return Ok(());
        }

        self.to_commit.check_compatible(&self.buffer)?;
        let buffer = self.buffer.take();
        self.to_commit.ingest_aggregator(buffer)
    }

    /// Rejects checkpoints of another family than the first one of the session, even when every
    /// earlier checkpoint was already committed.
    fn check_family(&self, family: StateFamily) -> SyncResult<()> {
        match self.family {
            Some(latched) if latched != family => bail!(
                ErrorKind::StateTypeMismatch,
                "Checkpoint family differs from the family of the session",
                format!("received a {family} checkpoint after {latched} checkpoints")
            ),
            _ => Ok(()),
        }
    }

    async fn check_migration(&mut self, envelope: &StateEnvelope) -> SyncResult<()> {
        if envelope.family() == StateFamily::Stream {
            let committed = self.state_api.get_state(self.connection_id).await?;

            if committed.is_some_and(|state| state.family() == StateFamily::Legacy) {
                info!(
                    connection_id = %self.connection_id,
                    "migrating from a legacy to a per-stream checkpoint, committing on close only"
                );
                self.flush_only_on_close = true;
            }
        }

        self.migration_checked = true;

        Ok(())
    }
}

async fn commit<S>(state_api: &S, connection_id: Uuid, state: AggregatedState) -> SyncResult<()>
where
    S: StateApi,
{
    counter!(SYNC_STATE_COMMIT_ATTEMPTS_TOTAL).increment(1);

    match state_api.create_or_update_state(connection_id, state).await {
        Ok(()) => {
            debug!(%connection_id, "checkpoint committed");
            Ok(())
        }
        Err(err) => {
            counter!(SYNC_STATE_COMMIT_FAILURES_TOTAL).increment(1);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use syncer_config::shared::ApiRetryConfig;

    use super::*;
    use crate::error::SyncError;
    use crate::persistence::api::MemoryStateApi;
    use crate::protocol::state::GlobalState;
    use crate::protocol::stream::StreamDescriptor;

    fn config() -> StateFlushConfig {
        StateFlushConfig {
            flush_period_ms: 1_000,
            final_flush_retry: ApiRetryConfig {
                max_elapsed_ms: 5_000,
                delay_ms: 1_000,
            },
        }
    }

    fn stream(name: &str, cursor: i64) -> StateEnvelope {
        StateEnvelope::stream(StreamDescriptor::new(name), json!({ "cursor": cursor }))
    }

    fn io_error() -> SyncError {
        SyncError::from((ErrorKind::IoError, "state api unavailable"))
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_once_the_period_elapsed() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();
        let mut persistence = SyncPersistence::new(connection_id, api.clone(), config());

        persistence.persist(connection_id, stream("a", 1)).await.unwrap();
        assert!(api.commits().await.is_empty());

        tokio::time::advance(Duration::from_millis(1_500)).await;
        persistence.persist(connection_id, stream("a", 2)).await.unwrap();

        let commits = api.commits().await;
        assert_eq!(commits.len(), 1);
        assert_eq!(
            commits[0].1,
            AggregatedState::from_envelopes([stream("a", 2)]).unwrap()
        );
        assert!(!persistence.has_pending_state());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_is_merged_into_the_next_one() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();
        let mut persistence = SyncPersistence::new(connection_id, api.clone(), config());
        api.fail_next_writes(vec![io_error()]).await;

        persistence.persist(connection_id, stream("a", 1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        persistence.persist(connection_id, stream("b", 1)).await.unwrap();
        assert!(api.commits().await.is_empty());
        assert!(persistence.has_pending_state());

        tokio::time::advance(Duration::from_millis(1_500)).await;
        persistence.persist(connection_id, stream("a", 2)).await.unwrap();

        let commits = api.commits().await;
        assert_eq!(commits.len(), 1);
        assert_eq!(
            commits[0].1,
            AggregatedState::from_envelopes([stream("a", 2), stream("b", 1)]).unwrap()
        );
    }

    #[tokio::test]
    async fn rejects_other_connections() {
        let connection_id = Uuid::new_v4();
        let mut persistence =
            SyncPersistence::new(connection_id, MemoryStateApi::new(), config());

        let err = persistence
            .persist(Uuid::new_v4(), stream("a", 1))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_to_stream_migration_commits_on_close_only() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();
        api.set_state(connection_id, AggregatedState::new(json!({"cursor": 1})))
            .await;
        let mut persistence = SyncPersistence::new(connection_id, api.clone(), config());

        persistence.persist(connection_id, stream("a", 1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(5_000)).await;
        persistence.persist(connection_id, stream("b", 1)).await.unwrap();
        assert!(api.commits().await.is_empty());

        persistence.close().await.unwrap();

        let commits = api.commits().await;
        assert_eq!(commits.len(), 1);
        assert_eq!(
            commits[0].1,
            AggregatedState::from_envelopes([stream("a", 1), stream("b", 1)]).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_retries_then_escalates() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();
        let mut persistence = SyncPersistence::new(connection_id, api.clone(), config());
        persistence.persist(connection_id, stream("a", 1)).await.unwrap();

        api.fail_next_writes(vec![io_error(), io_error()]).await;
        let mut retried = SyncPersistence::new(connection_id, api.clone(), config());
        retried.persist(connection_id, stream("a", 1)).await.unwrap();
        retried.close().await.unwrap();
        assert_eq!(api.commits().await.len(), 1);

        api.fail_next_writes((0..10).map(|_| io_error()).collect()).await;
        let err = persistence.close().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatePersistenceFailed);
    }

    #[tokio::test]
    async fn mixed_families_fail_immediately() {
        let connection_id = Uuid::new_v4();
        let mut persistence =
            SyncPersistence::new(connection_id, MemoryStateApi::new(), config());

        persistence.persist(connection_id, stream("a", 1)).await.unwrap();
        let err = persistence
            .persist(connection_id, StateEnvelope::legacy(json!({})))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn family_is_kept_across_successful_flushes() {
        let api = MemoryStateApi::new();
        let connection_id = Uuid::new_v4();
        let mut persistence = SyncPersistence::new(connection_id, api.clone(), config());

        persistence.persist(connection_id, stream("a", 1)).await.unwrap();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        persistence.persist(connection_id, stream("a", 2)).await.unwrap();
        assert_eq!(api.commits().await.len(), 1);
        assert!(!persistence.has_pending_state());

        let err = persistence
            .persist(connection_id, StateEnvelope::global(GlobalState::default()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);
        assert!(!persistence.has_pending_state());
        assert_eq!(api.commits().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_roll_keeps_the_buffer() {
        let connection_id = Uuid::new_v4();
        let mut persistence =
            SyncPersistence::new(connection_id, MemoryStateApi::new(), config());
        persistence.to_commit.ingest(stream("a", 1)).unwrap();
        persistence
            .buffer
            .ingest(StateEnvelope::global(GlobalState::default()))
            .unwrap();

        let err = persistence.flush().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateTypeMismatch);
        assert_eq!(persistence.buffer.family(), Some(StateFamily::Global));
        assert_eq!(persistence.to_commit.family(), Some(StateFamily::Stream));
    }
}
