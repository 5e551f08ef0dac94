//! Sync run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use rostersync_core::{ItemError, RunStatus, SyncCounts, SyncError, SyncResult, SyncType};

/// One execution of a sync operation.
///
/// Inserted with status `running` when the run starts and finalized exactly
/// once with a terminal status, counts and the structured error list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub config_id: Uuid,
    pub sync_type: SyncType,
    pub status: RunStatus,
    pub counts: SyncCounts,
    pub errors: Vec<ItemError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Store for sync run logs.
#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

impl RunStore {
    /// Create a new run store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new run with status `running`.
    #[instrument(skip(self))]
    pub async fn start(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun> {
        let row = sqlx::query_as::<_, RunRow>(
            r"
            INSERT INTO sync_runs (config_id, sync_type)
            VALUES ($1, $2)
            RETURNING id, config_id, sync_type, status, created_count, updated_count,
                      skipped_count, conflict_count, errors, started_at, completed_at
            ",
        )
        .bind(config_id)
        .bind(sync_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.into_run()
    }

    /// Finalize a run exactly once.
    ///
    /// The update is conditional on the run still being `running`; a second
    /// finalize attempt is an internal error.
    #[instrument(skip(self, counts, errors))]
    pub async fn finalize(
        &self,
        run_id: Uuid,
        status: RunStatus,
        counts: SyncCounts,
        errors: &[ItemError],
    ) -> SyncResult<SyncRun> {
        let errors_json = serde_json::to_value(errors)?;

        let row = sqlx::query_as::<_, RunRow>(
            r"
            UPDATE sync_runs
            SET status = $2,
                created_count = $3,
                updated_count = $4,
                skipped_count = $5,
                conflict_count = $6,
                errors = $7,
                completed_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING id, config_id, sync_type, status, created_count, updated_count,
                      skipped_count, conflict_count, errors, started_at, completed_at
            ",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(counts.created as i32)
        .bind(counts.updated as i32)
        .bind(counts.skipped as i32)
        .bind(counts.conflicts as i32)
        .bind(errors_json)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunRow::into_run).transpose()?.ok_or_else(|| {
            SyncError::internal(format!("run {run_id} is not running or does not exist"))
        })
    }

    /// Get a run by id.
    #[instrument(skip(self))]
    pub async fn get(&self, run_id: Uuid) -> SyncResult<Option<SyncRun>> {
        let row = sqlx::query_as::<_, RunRow>(
            r"
            SELECT id, config_id, sync_type, status, created_count, updated_count,
                   skipped_count, conflict_count, errors, started_at, completed_at
            FROM sync_runs
            WHERE id = $1
            ",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunRow::into_run).transpose()
    }

    /// Most recent run for a config.
    #[instrument(skip(self))]
    pub async fn latest(&self, config_id: Uuid) -> SyncResult<Option<SyncRun>> {
        let row = sqlx::query_as::<_, RunRow>(
            r"
            SELECT id, config_id, sync_type, status, created_count, updated_count,
                   skipped_count, conflict_count, errors, started_at, completed_at
            FROM sync_runs
            WHERE config_id = $1
            ORDER BY started_at DESC
            LIMIT 1
            ",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunRow::into_run).transpose()
    }

    /// Paginated run history, most recent first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        config_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r"
            SELECT id, config_id, sync_type, status, created_count, updated_count,
                   skipped_count, conflict_count, errors, started_at, completed_at
            FROM sync_runs
            WHERE config_id = $1
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(config_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRow::into_run).collect()
    }
}

impl std::fmt::Debug for RunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStore").finish_non_exhaustive()
    }
}

/// Database row for a sync run.
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    config_id: Uuid,
    sync_type: String,
    status: String,
    created_count: i32,
    updated_count: i32,
    skipped_count: i32,
    conflict_count: i32,
    errors: serde_json::Value,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl RunRow {
    fn into_run(self) -> SyncResult<SyncRun> {
        let sync_type = self
            .sync_type
            .parse::<SyncType>()
            .map_err(SyncError::internal)?;
        let status = self
            .status
            .parse::<RunStatus>()
            .map_err(SyncError::internal)?;
        let errors: Vec<ItemError> = serde_json::from_value(self.errors)?;

        Ok(SyncRun {
            id: self.id,
            config_id: self.config_id,
            sync_type,
            status,
            counts: SyncCounts {
                created: self.created_count.max(0) as u32,
                updated: self.updated_count.max(0) as u32,
                skipped: self.skipped_count.max(0) as u32,
                conflicts: self.conflict_count.max(0) as u32,
            },
            errors,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}
