//! Unified persistence seam for the sync engine.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use rostersync_core::{
    EntityKind, ItemError, Resolution, RunStatus, SyncCounts, SyncResult, SyncType,
};

use crate::config::{ConfigStore, OrgSyncConfig, SaveConfig};
use crate::conflict::{ConflictStore, NewConflict, SyncConflict};
use crate::crypto::CredentialCipher;
use crate::mapping::{EntityMapping, MappingStore};
use crate::run::{RunStore, SyncRun};

/// Everything the engine needs to persist.
///
/// The orchestrator and service depend on this trait rather than on the
/// concrete Postgres stores, so engine tests can run against in-memory
/// doubles without a database.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // Configs

    async fn save_config(&self, params: &SaveConfig) -> SyncResult<Uuid>;

    async fn get_config(&self, organization_id: Uuid) -> SyncResult<Option<OrgSyncConfig>>;

    async fn get_config_by_id(&self, config_id: Uuid) -> SyncResult<Option<OrgSyncConfig>>;

    async fn get_all_configs(&self) -> SyncResult<Vec<OrgSyncConfig>>;

    async fn delete_config(&self, config_id: Uuid) -> SyncResult<bool>;

    /// Decrypt the stored registry password for a config.
    fn decrypt_password(&self, config: &OrgSyncConfig) -> SyncResult<String>;

    /// Atomically claim the in-progress guard. Returns false if held.
    async fn claim_sync(&self, config_id: Uuid) -> SyncResult<bool>;

    /// Release the in-progress guard. Unconditional.
    async fn release_sync(&self, config_id: Uuid) -> SyncResult<()>;

    async fn touch_last_sync(&self, config_id: Uuid) -> SyncResult<()>;

    // Mappings

    async fn find_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<Option<EntityMapping>>;

    async fn list_mappings(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
    ) -> SyncResult<Vec<EntityMapping>>;

    async fn upsert_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        local_id: Uuid,
        remote_id: &str,
    ) -> SyncResult<EntityMapping>;

    async fn mark_mapping_synced(&self, mapping_id: Uuid) -> SyncResult<()>;

    // Runs

    async fn start_run(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun>;

    async fn finalize_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        counts: SyncCounts,
        errors: &[ItemError],
    ) -> SyncResult<SyncRun>;

    async fn get_run(&self, run_id: Uuid) -> SyncResult<Option<SyncRun>>;

    async fn latest_run(&self, config_id: Uuid) -> SyncResult<Option<SyncRun>>;

    async fn list_runs(
        &self,
        config_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<SyncRun>>;

    // Conflicts

    async fn create_conflict(&self, conflict: &NewConflict) -> SyncResult<SyncConflict>;

    async fn has_pending_conflict(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<bool>;

    async fn list_pending_conflicts(&self, organization_id: Uuid)
        -> SyncResult<Vec<SyncConflict>>;

    async fn count_pending_conflicts(&self, config_id: Uuid) -> SyncResult<i64>;

    async fn get_conflict(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>>;

    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> SyncResult<SyncConflict>;
}

/// Postgres-backed [`SyncStore`] assembled from the per-concern stores.
#[derive(Debug, Clone)]
pub struct PgSyncStore {
    configs: ConfigStore,
    mappings: MappingStore,
    runs: RunStore,
    conflicts: ConflictStore,
}

impl PgSyncStore {
    /// Build a store over one pool with the given credential cipher.
    #[must_use]
    pub fn new(pool: PgPool, cipher: CredentialCipher) -> Self {
        Self {
            configs: ConfigStore::new(pool.clone(), cipher),
            mappings: MappingStore::new(pool.clone()),
            runs: RunStore::new(pool.clone()),
            conflicts: ConflictStore::new(pool),
        }
    }
}

#[async_trait]
impl SyncStore for PgSyncStore {
    async fn save_config(&self, params: &SaveConfig) -> SyncResult<Uuid> {
        self.configs.save(params).await
    }

    async fn get_config(&self, organization_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        self.configs.get(organization_id).await
    }

    async fn get_config_by_id(&self, config_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        self.configs.get_by_id(config_id).await
    }

    async fn get_all_configs(&self) -> SyncResult<Vec<OrgSyncConfig>> {
        self.configs.get_all().await
    }

    async fn delete_config(&self, config_id: Uuid) -> SyncResult<bool> {
        self.configs.delete(config_id).await
    }

    fn decrypt_password(&self, config: &OrgSyncConfig) -> SyncResult<String> {
        self.configs.decrypt_password(config)
    }

    async fn claim_sync(&self, config_id: Uuid) -> SyncResult<bool> {
        self.configs.claim_sync(config_id).await
    }

    async fn release_sync(&self, config_id: Uuid) -> SyncResult<()> {
        self.configs.release_sync(config_id).await
    }

    async fn touch_last_sync(&self, config_id: Uuid) -> SyncResult<()> {
        self.configs.touch_last_sync(config_id).await
    }

    async fn find_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<Option<EntityMapping>> {
        self.mappings
            .find(organization_id, entity_kind, remote_id)
            .await
    }

    async fn list_mappings(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
    ) -> SyncResult<Vec<EntityMapping>> {
        self.mappings
            .list_for_kind(organization_id, entity_kind)
            .await
    }

    async fn upsert_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        local_id: Uuid,
        remote_id: &str,
    ) -> SyncResult<EntityMapping> {
        self.mappings
            .upsert(organization_id, entity_kind, local_id, remote_id)
            .await
    }

    async fn mark_mapping_synced(&self, mapping_id: Uuid) -> SyncResult<()> {
        self.mappings.mark_synced(mapping_id).await
    }

    async fn start_run(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun> {
        self.runs.start(config_id, sync_type).await
    }

    async fn finalize_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        counts: SyncCounts,
        errors: &[ItemError],
    ) -> SyncResult<SyncRun> {
        self.runs.finalize(run_id, status, counts, errors).await
    }

    async fn get_run(&self, run_id: Uuid) -> SyncResult<Option<SyncRun>> {
        self.runs.get(run_id).await
    }

    async fn latest_run(&self, config_id: Uuid) -> SyncResult<Option<SyncRun>> {
        self.runs.latest(config_id).await
    }

    async fn list_runs(
        &self,
        config_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<SyncRun>> {
        self.runs.list(config_id, limit, offset).await
    }

    async fn create_conflict(&self, conflict: &NewConflict) -> SyncResult<SyncConflict> {
        self.conflicts.create(conflict).await
    }

    async fn has_pending_conflict(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<bool> {
        self.conflicts
            .has_pending(organization_id, entity_kind, remote_id)
            .await
    }

    async fn list_pending_conflicts(
        &self,
        organization_id: Uuid,
    ) -> SyncResult<Vec<SyncConflict>> {
        self.conflicts.list_pending(organization_id).await
    }

    async fn count_pending_conflicts(&self, config_id: Uuid) -> SyncResult<i64> {
        self.conflicts.count_pending(config_id).await
    }

    async fn get_conflict(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>> {
        self.conflicts.get(conflict_id).await
    }

    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> SyncResult<SyncConflict> {
        self.conflicts.resolve(conflict_id, resolution).await
    }
}
