//! Local-to-remote identity mappings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use rostersync_core::{EntityKind, SyncError, SyncResult};

/// A persisted correspondence between one local record and one remote
/// record.
///
/// Unique per (organization, entity kind, remote id). Created on the first
/// successful match or create, refreshed on each reconciled sync, never
/// silently deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMapping {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub entity_kind: EntityKind,
    pub local_id: Uuid,
    pub remote_id: String,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Store for entity mappings.
#[derive(Clone)]
pub struct MappingStore {
    pool: PgPool,
}

impl MappingStore {
    /// Create a new mapping store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a mapping by its natural key.
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<Option<EntityMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            r"
            SELECT id, organization_id, entity_kind, local_id, remote_id,
                   last_synced_at, created_at
            FROM sync_entity_mappings
            WHERE organization_id = $1 AND entity_kind = $2 AND remote_id = $3
            ",
        )
        .bind(organization_id)
        .bind(entity_kind.as_str())
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MappingRow::into_mapping).transpose()
    }

    /// List all mappings of one kind for an organization.
    #[instrument(skip(self))]
    pub async fn list_for_kind(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
    ) -> SyncResult<Vec<EntityMapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            r"
            SELECT id, organization_id, entity_kind, local_id, remote_id,
                   last_synced_at, created_at
            FROM sync_entity_mappings
            WHERE organization_id = $1 AND entity_kind = $2
            ORDER BY created_at
            ",
        )
        .bind(organization_id)
        .bind(entity_kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MappingRow::into_mapping).collect()
    }

    /// Create or refresh a mapping.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        local_id: Uuid,
        remote_id: &str,
    ) -> SyncResult<EntityMapping> {
        let row = sqlx::query_as::<_, MappingRow>(
            r"
            INSERT INTO sync_entity_mappings (
                organization_id, entity_kind, local_id, remote_id
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (organization_id, entity_kind, remote_id) DO UPDATE SET
                local_id = EXCLUDED.local_id,
                last_synced_at = NOW()
            RETURNING id, organization_id, entity_kind, local_id, remote_id,
                      last_synced_at, created_at
            ",
        )
        .bind(organization_id)
        .bind(entity_kind.as_str())
        .bind(local_id)
        .bind(remote_id)
        .fetch_one(&self.pool)
        .await?;

        row.into_mapping()
    }

    /// Refresh `last_synced_at` after a reconciled update.
    #[instrument(skip(self))]
    pub async fn mark_synced(&self, mapping_id: Uuid) -> SyncResult<()> {
        sqlx::query(
            r"
            UPDATE sync_entity_mappings
            SET last_synced_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(mapping_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for MappingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingStore").finish_non_exhaustive()
    }
}

/// Database row for an entity mapping.
#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    id: Uuid,
    organization_id: Uuid,
    entity_kind: String,
    local_id: Uuid,
    remote_id: String,
    last_synced_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_mapping(self) -> SyncResult<EntityMapping> {
        let entity_kind = self
            .entity_kind
            .parse::<EntityKind>()
            .map_err(SyncError::internal)?;

        Ok(EntityMapping {
            id: self.id,
            organization_id: self.organization_id,
            entity_kind,
            local_id: self.local_id,
            remote_id: self.remote_id,
            last_synced_at: self.last_synced_at,
            created_at: self.created_at,
        })
    }
}
