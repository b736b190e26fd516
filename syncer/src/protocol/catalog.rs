use serde::{Deserialize, Serialize};

use crate::protocol::stream::StreamDescriptor;

/// How the source reads a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

/// How the destination writes a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    Append,
    Overwrite,
    AppendDedup,
    OverwriteDedup,
}

/// A stream of the catalog together with how it is synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    pub sync_mode: SyncMode,
    pub destination_sync_mode: DestinationSyncMode,
    /// Whether a full refresh of this stream can checkpoint mid-sync. Unknown means no.
    #[serde(default)]
    pub is_resumable: Option<bool>,
}

impl ConfiguredStream {
    pub fn new(
        stream: StreamDescriptor,
        sync_mode: SyncMode,
        destination_sync_mode: DestinationSyncMode,
    ) -> Self {
        Self {
            stream,
            sync_mode,
            destination_sync_mode,
            is_resumable: None,
        }
    }

    pub fn with_resumable(mut self, is_resumable: bool) -> Self {
        self.is_resumable = Some(is_resumable);
        self
    }

    pub fn is_full_refresh(&self) -> bool {
        self.sync_mode == SyncMode::FullRefresh
    }

    pub fn is_resumable(&self) -> bool {
        self.is_resumable.unwrap_or(false)
    }

    /// Returns `true` for full refresh streams that cannot checkpoint on their own.
    pub fn is_non_resumable_full_refresh(&self) -> bool {
        self.is_full_refresh() && !self.is_resumable()
    }
}

/// Ordered list of the streams synced by a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    pub streams: Vec<ConfiguredStream>,
}

impl ConfiguredCatalog {
    pub fn new(streams: Vec<ConfiguredStream>) -> Self {
        Self { streams }
    }

    pub fn find(&self, descriptor: &StreamDescriptor) -> Option<&ConfiguredStream> {
        self.streams
            .iter()
            .find(|configured| &configured.stream == descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_resumability_counts_as_non_resumable() {
        let stream = ConfiguredStream::new(
            StreamDescriptor::new("users"),
            SyncMode::FullRefresh,
            DestinationSyncMode::Overwrite,
        );
        assert!(stream.is_non_resumable_full_refresh());

        let stream = stream.with_resumable(true);
        assert!(!stream.is_non_resumable_full_refresh());
    }

    #[test]
    fn incremental_streams_are_never_non_resumable_full_refresh() {
        let stream = ConfiguredStream::new(
            StreamDescriptor::new("logs"),
            SyncMode::Incremental,
            DestinationSyncMode::AppendDedup,
        )
        .with_resumable(false);

        assert!(!stream.is_non_resumable_full_refresh());
    }
}
