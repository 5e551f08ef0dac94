//! Host-facing service surface.
//!
//! Thin coordination layer the host application calls into: config CRUD,
//! connection testing, starting syncs, status/log queries and conflict
//! review. Validation of caller input happens here; the stores trust their
//! callers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use rostersync_core::{Resolution, SyncError, SyncResult, SyncType};
use rostersync_registry::{RegistryCredentials, RegistryFactory};
use rostersync_store::{OrgSyncConfig, SaveConfig, SyncConflict, SyncRun, SyncStore};

use crate::local::LocalRoster;
use crate::orchestrator::SyncOrchestrator;

/// Upper bound on one page of run logs.
pub const MAX_LOG_PAGE_SIZE: i64 = 100;

/// Result of a connection test. Credential failure is a normal outcome,
/// not an error.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub error: Option<String>,
}

/// Current sync state of one organization.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub config: OrgSyncConfig,
    pub latest_run: Option<SyncRun>,
    pub pending_conflicts: i64,
}

/// The engine's inbound surface.
pub struct SyncService {
    store: Arc<dyn SyncStore>,
    registry: Arc<dyn RegistryFactory>,
    local: Arc<dyn LocalRoster>,
    orchestrator: SyncOrchestrator,
}

impl SyncService {
    /// Assemble the service and its orchestrator over shared seams.
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        registry: Arc<dyn RegistryFactory>,
        local: Arc<dyn LocalRoster>,
    ) -> Self {
        let orchestrator =
            SyncOrchestrator::new(store.clone(), registry.clone(), local.clone());
        Self {
            store,
            registry,
            local,
            orchestrator,
        }
    }

    /// Replace the default orchestrator (e.g. to shorten the run timeout).
    #[must_use]
    pub fn with_orchestrator(mut self, orchestrator: SyncOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    // Configuration

    /// Create or update an organization's sync config.
    #[instrument(skip(self, params))]
    pub async fn save_config(&self, params: &SaveConfig) -> SyncResult<OrgSyncConfig> {
        let config_id = self.store.save_config(params).await?;
        self.store
            .get_config_by_id(config_id)
            .await?
            .ok_or_else(|| SyncError::internal("saved config not found"))
    }

    /// Get the config for an organization.
    pub async fn get_config(&self, organization_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        self.store.get_config(organization_id).await
    }

    /// List all configs. Credentials stay encrypted.
    pub async fn get_all_configs(&self) -> SyncResult<Vec<OrgSyncConfig>> {
        self.store.get_all_configs().await
    }

    /// Delete a config. Run history and conflicts are retained.
    #[instrument(skip(self))]
    pub async fn delete_config(&self, config_id: Uuid) -> SyncResult<bool> {
        let deleted = self.store.delete_config(config_id).await?;
        if deleted {
            info!(%config_id, "sync config deleted");
        }
        Ok(deleted)
    }

    /// Probe the registry with throwaway credentials.
    ///
    /// Builds a disposable client, authenticates and performs one
    /// lightweight read. Nothing is persisted.
    #[instrument(skip(self, credentials))]
    pub async fn test_connection(&self, credentials: RegistryCredentials) -> ConnectionTest {
        let client = match self.registry.create(credentials) {
            Ok(client) => client,
            Err(e) => {
                return ConnectionTest {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        match client.test_connection().await {
            Ok(()) => ConnectionTest {
                success: true,
                error: None,
            },
            Err(e) => ConnectionTest {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    // Sync execution

    /// Start a sync run for an organization.
    #[instrument(skip(self))]
    pub async fn start_sync(
        &self,
        organization_id: Uuid,
        sync_type: SyncType,
    ) -> SyncResult<SyncRun> {
        let config = self.require_config(organization_id).await?;
        self.orchestrator.start(config.id, sync_type).await
    }

    // Status and logs

    /// Config, latest run and pending-conflict count for an organization.
    pub async fn get_status(&self, organization_id: Uuid) -> SyncResult<SyncStatus> {
        let config = self.require_config(organization_id).await?;
        let latest_run = self.store.latest_run(config.id).await?;
        let pending_conflicts = self.store.count_pending_conflicts(config.id).await?;

        Ok(SyncStatus {
            config,
            latest_run,
            pending_conflicts,
        })
    }

    /// Paginated run history, most recent first. Page size is capped at
    /// [`MAX_LOG_PAGE_SIZE`]; requests above the cap are rejected.
    pub async fn get_logs(
        &self,
        organization_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<SyncRun>> {
        if limit < 1 || limit > MAX_LOG_PAGE_SIZE {
            return Err(SyncError::validation_field(
                "limit",
                format!("limit must be between 1 and {MAX_LOG_PAGE_SIZE}"),
            ));
        }
        if offset < 0 {
            return Err(SyncError::validation_field(
                "offset",
                "offset must not be negative",
            ));
        }

        let config = self.require_config(organization_id).await?;
        self.store.list_runs(config.id, limit, offset).await
    }

    /// Full detail of one run, including its error list.
    pub async fn get_log_detail(&self, run_id: Uuid) -> SyncResult<SyncRun> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sync run", run_id.to_string()))
    }

    // Conflict review

    /// Unresolved conflicts for an organization, oldest first.
    pub async fn list_conflicts(&self, organization_id: Uuid) -> SyncResult<Vec<SyncConflict>> {
        self.store.list_pending_conflicts(organization_id).await
    }

    /// Resolve a conflict and apply the winning side.
    ///
    /// Either way the remote id ends up mapped, so subsequent syncs
    /// reconcile it normally instead of re-quarantining.
    ///
    /// The winning snapshot and the mapping are applied first; the
    /// resolution flips last. An apply failure leaves the conflict pending
    /// and the call retryable.
    #[instrument(skip(self))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> SyncResult<SyncConflict> {
        if resolution.is_pending() {
            return Err(SyncError::validation(
                "resolution must pick a winning side",
            ));
        }

        let conflict = self
            .store
            .get_conflict(conflict_id)
            .await?
            .ok_or_else(|| SyncError::not_found("conflict", conflict_id.to_string()))?;
        if !conflict.resolution.is_pending() {
            return Err(SyncError::conflict(format!(
                "conflict {conflict_id} already resolved as {}",
                conflict.resolution
            )));
        }

        match resolution {
            Resolution::Pending => {}
            Resolution::RemoteWins => {
                let name = conflict
                    .remote_snapshot
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let attributes = conflict
                    .remote_snapshot
                    .get("attributes")
                    .cloned()
                    .unwrap_or(Value::Null);

                // The quarantined local record may have been deleted while
                // the conflict sat in review; recreate it in that case.
                let existing = match conflict.local_id {
                    Some(id) => self.local.get(conflict.entity_kind, id).await?,
                    None => None,
                };
                let local_id = match existing {
                    Some(record) => {
                        self.local
                            .update(conflict.entity_kind, record.id, &name, &attributes)
                            .await?;
                        record.id
                    }
                    None => {
                        self.local
                            .create(
                                conflict.organization_id,
                                conflict.entity_kind,
                                &name,
                                &attributes,
                            )
                            .await?
                    }
                };
                self.store
                    .upsert_mapping(
                        conflict.organization_id,
                        conflict.entity_kind,
                        local_id,
                        &conflict.remote_id,
                    )
                    .await?;
            }
            Resolution::LocalWins => {
                if let Some(local_id) = conflict.local_id {
                    self.store
                        .upsert_mapping(
                            conflict.organization_id,
                            conflict.entity_kind,
                            local_id,
                            &conflict.remote_id,
                        )
                        .await?;
                }
            }
        }

        // Flipping last keeps the resolved-only-once guard against
        // concurrent resolvers without stranding a half-applied state.
        let resolved = self.store.resolve_conflict(conflict_id, resolution).await?;

        info!(
            %conflict_id,
            resolution = %resolution,
            remote_id = %resolved.remote_id,
            "conflict resolved"
        );
        Ok(resolved)
    }

    async fn require_config(&self, organization_id: Uuid) -> SyncResult<OrgSyncConfig> {
        self.store
            .get_config(organization_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sync config", organization_id.to_string()))
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService").finish_non_exhaustive()
    }
}
