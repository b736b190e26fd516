use uuid::Uuid;

use crate::protocol::catalog::ConfiguredCatalog;

/// Identity and inputs of one replication attempt.
///
/// Built once when the attempt starts and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ReplicationContext {
    pub connection_id: Uuid,
    pub job_id: i64,
    pub attempt_number: i32,
    pub workspace_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub catalog: ConfiguredCatalog,
    /// The attempt clears destination data instead of syncing it.
    pub is_reset: bool,
    /// The destination supports refreshes, so full refresh streams may be truncated lazily.
    pub supports_refreshes: bool,
}

impl ReplicationContext {
    /// Creates a context for a regular (non-reset) sync attempt.
    pub fn new(
        connection_id: Uuid,
        job_id: i64,
        attempt_number: i32,
        workspace_id: Uuid,
        catalog: ConfiguredCatalog,
    ) -> Self {
        Self {
            connection_id,
            job_id,
            attempt_number,
            workspace_id,
            organization_id: None,
            source_id: Uuid::nil(),
            destination_id: Uuid::nil(),
            catalog,
            is_reset: false,
            supports_refreshes: false,
        }
    }

    pub fn with_organization_id(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_actors(mut self, source_id: Uuid, destination_id: Uuid) -> Self {
        self.source_id = source_id;
        self.destination_id = destination_id;
        self
    }

    pub fn as_reset(mut self) -> Self {
        self.is_reset = true;
        self
    }

    pub fn with_refreshes_supported(mut self, supports_refreshes: bool) -> Self {
        self.supports_refreshes = supports_refreshes;
        self
    }
}
