//! Quarantined sync conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use rostersync_core::{ConflictKind, EntityKind, Resolution, SyncError, SyncResult};

/// A detected clash between a local record and a remote record.
///
/// Conflicts are quarantined rather than auto-resolved: the remote record
/// stays unmapped and is skipped by subsequent syncs until a reviewer picks
/// a winning side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: Uuid,
    pub config_id: Uuid,
    pub organization_id: Uuid,
    pub entity_kind: EntityKind,
    pub conflict_kind: ConflictKind,
    pub local_id: Option<Uuid>,
    pub remote_id: String,
    pub local_snapshot: serde_json::Value,
    pub remote_snapshot: serde_json::Value,
    pub resolution: Resolution,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for recording a new conflict.
#[derive(Debug, Clone)]
pub struct NewConflict {
    pub config_id: Uuid,
    pub organization_id: Uuid,
    pub entity_kind: EntityKind,
    pub conflict_kind: ConflictKind,
    pub local_id: Option<Uuid>,
    pub remote_id: String,
    pub local_snapshot: serde_json::Value,
    pub remote_snapshot: serde_json::Value,
}

/// Store for sync conflicts.
#[derive(Clone)]
pub struct ConflictStore {
    pool: PgPool,
}

impl ConflictStore {
    /// Create a new conflict store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a conflict with both snapshots for review.
    #[instrument(skip(self, conflict))]
    pub async fn create(&self, conflict: &NewConflict) -> SyncResult<SyncConflict> {
        let row = sqlx::query_as::<_, ConflictRow>(
            r"
            INSERT INTO sync_conflicts (
                config_id, organization_id, entity_kind, conflict_kind,
                local_id, remote_id, local_snapshot, remote_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, config_id, organization_id, entity_kind, conflict_kind,
                      local_id, remote_id, local_snapshot, remote_snapshot,
                      resolution, resolved_at, created_at
            ",
        )
        .bind(conflict.config_id)
        .bind(conflict.organization_id)
        .bind(conflict.entity_kind.as_str())
        .bind(conflict.conflict_kind.as_str())
        .bind(conflict.local_id)
        .bind(&conflict.remote_id)
        .bind(&conflict.local_snapshot)
        .bind(&conflict.remote_snapshot)
        .fetch_one(&self.pool)
        .await?;

        row.into_conflict()
    }

    /// Whether a pending conflict exists for a remote record.
    ///
    /// Reconciliation consults this before mapping a remote record; a
    /// pending conflict blocks mapping creation until resolved.
    #[instrument(skip(self))]
    pub async fn has_pending(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<bool> {
        let row: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM sync_conflicts
                WHERE organization_id = $1
                  AND entity_kind = $2
                  AND remote_id = $3
                  AND resolution = 'pending'
            )
            ",
        )
        .bind(organization_id)
        .bind(entity_kind.as_str())
        .bind(remote_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// All unresolved conflicts for an organization, oldest first.
    #[instrument(skip(self))]
    pub async fn list_pending(&self, organization_id: Uuid) -> SyncResult<Vec<SyncConflict>> {
        let rows = sqlx::query_as::<_, ConflictRow>(
            r"
            SELECT id, config_id, organization_id, entity_kind, conflict_kind,
                   local_id, remote_id, local_snapshot, remote_snapshot,
                   resolution, resolved_at, created_at
            FROM sync_conflicts
            WHERE organization_id = $1 AND resolution = 'pending'
            ORDER BY created_at
            ",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }

    /// Count unresolved conflicts for a config.
    #[instrument(skip(self))]
    pub async fn count_pending(&self, config_id: Uuid) -> SyncResult<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM sync_conflicts
            WHERE config_id = $1 AND resolution = 'pending'
            ",
        )
        .bind(config_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Get a conflict by id.
    #[instrument(skip(self))]
    pub async fn get(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>> {
        let row = sqlx::query_as::<_, ConflictRow>(
            r"
            SELECT id, config_id, organization_id, entity_kind, conflict_kind,
                   local_id, remote_id, local_snapshot, remote_snapshot,
                   resolution, resolved_at, created_at
            FROM sync_conflicts
            WHERE id = $1
            ",
        )
        .bind(conflict_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConflictRow::into_conflict).transpose()
    }

    /// Resolve a pending conflict.
    ///
    /// The update is conditional on the conflict still being pending, so
    /// concurrent resolutions cannot both win. Resolving to `pending` is
    /// rejected; an already-resolved conflict is a conflict error.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> SyncResult<SyncConflict> {
        if resolution.is_pending() {
            return Err(SyncError::validation(
                "resolution must pick a winning side",
            ));
        }

        let row = sqlx::query_as::<_, ConflictRow>(
            r"
            UPDATE sync_conflicts
            SET resolution = $2, resolved_at = NOW()
            WHERE id = $1 AND resolution = 'pending'
            RETURNING id, config_id, organization_id, entity_kind, conflict_kind,
                      local_id, remote_id, local_snapshot, remote_snapshot,
                      resolution, resolved_at, created_at
            ",
        )
        .bind(conflict_id)
        .bind(resolution.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_conflict(),
            None => match self.get(conflict_id).await? {
                Some(existing) => Err(SyncError::conflict(format!(
                    "conflict {conflict_id} already resolved as {}",
                    existing.resolution
                ))),
                None => Err(SyncError::not_found("conflict", conflict_id.to_string())),
            },
        }
    }
}

impl std::fmt::Debug for ConflictStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictStore").finish_non_exhaustive()
    }
}

/// Database row for a sync conflict.
#[derive(Debug, sqlx::FromRow)]
struct ConflictRow {
    id: Uuid,
    config_id: Uuid,
    organization_id: Uuid,
    entity_kind: String,
    conflict_kind: String,
    local_id: Option<Uuid>,
    remote_id: String,
    local_snapshot: serde_json::Value,
    remote_snapshot: serde_json::Value,
    resolution: String,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ConflictRow {
    fn into_conflict(self) -> SyncResult<SyncConflict> {
        let entity_kind = self
            .entity_kind
            .parse::<EntityKind>()
            .map_err(SyncError::internal)?;
        let conflict_kind = self
            .conflict_kind
            .parse::<ConflictKind>()
            .map_err(SyncError::internal)?;
        let resolution = self
            .resolution
            .parse::<Resolution>()
            .map_err(SyncError::internal)?;

        Ok(SyncConflict {
            id: self.id,
            config_id: self.config_id,
            organization_id: self.organization_id,
            entity_kind,
            conflict_kind,
            local_id: self.local_id,
            remote_id: self.remote_id,
            local_snapshot: self.local_snapshot,
            remote_snapshot: self.remote_snapshot,
            resolution,
            resolved_at: self.resolved_at,
            created_at: self.created_at,
        })
    }
}
