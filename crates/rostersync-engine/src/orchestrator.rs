//! Sync run orchestration.
//!
//! Owns the run lifecycle: claim the per-organization guard, open a run
//! record, execute the phase bodies against the remote registry, and
//! finalize and release on every exit path.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use rostersync_core::{
    EntityKind, ItemError, RunStatus, SyncCounts, SyncError, SyncResult, SyncType,
};
use rostersync_registry::{RegistryApi, RegistryCredentials, RegistryFactory};
use rostersync_store::{OrgSyncConfig, SyncRun, SyncStore};

use crate::local::LocalRoster;
use crate::reconcile::{ReconcileOutcome, Reconciler};

/// Default wall-clock bound on one run. A hung remote call must not hold
/// the in-progress guard indefinitely.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 900;

/// Accumulated outcome of a run's phase bodies.
#[derive(Debug, Default)]
struct PhaseReport {
    counts: SyncCounts,
    errors: Vec<ItemError>,
}

impl PhaseReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created => self.counts.created += 1,
            ReconcileOutcome::Updated => self.counts.updated += 1,
            ReconcileOutcome::Skipped => self.counts.skipped += 1,
            // Quarantined duplicates are counted apart from the processed
            // tallies and are not per-item errors; reviewers find them
            // through the pending-conflict queue.
            ReconcileOutcome::Conflict(_) => self.counts.conflicts += 1,
        }
    }

    fn status(&self) -> RunStatus {
        if self.errors.is_empty() {
            RunStatus::Success
        } else if self.counts.total() > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

/// Runs sync operations for one deployment.
pub struct SyncOrchestrator {
    store: Arc<dyn SyncStore>,
    registry: Arc<dyn RegistryFactory>,
    local: Arc<dyn LocalRoster>,
    run_timeout: Duration,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default run timeout.
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        registry: Arc<dyn RegistryFactory>,
        local: Arc<dyn LocalRoster>,
    ) -> Self {
        Self {
            store,
            registry,
            local,
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
        }
    }

    /// Override the per-run timeout.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Sync teams only.
    pub async fn sync_teams(&self, config_id: Uuid) -> SyncResult<SyncRun> {
        self.run(config_id, SyncType::Teams).await
    }

    /// Sync players only. Depends on existing team mappings.
    pub async fn sync_players(&self, config_id: Uuid) -> SyncResult<SyncRun> {
        self.run(config_id, SyncType::Players).await
    }

    /// Sync seasons only.
    pub async fn sync_seasons(&self, config_id: Uuid) -> SyncResult<SyncRun> {
        self.run(config_id, SyncType::Seasons).await
    }

    /// Composed run: teams, then players, then seasons, under one guard
    /// and one run record.
    pub async fn sync_full(&self, config_id: Uuid) -> SyncResult<SyncRun> {
        self.run(config_id, SyncType::Full).await
    }

    /// Start a run of the given type.
    pub async fn start(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun> {
        self.run(config_id, sync_type).await
    }

    #[instrument(skip(self))]
    async fn run(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun> {
        let config = self
            .store
            .get_config_by_id(config_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sync config", config_id.to_string()))?;

        if !config.sync_enabled {
            return Err(SyncError::validation(format!(
                "sync is disabled for organization {}",
                config.organization_name
            )));
        }

        // Atomic claim: a concurrent start loses here, with no run record
        // and no data changes.
        if !self.store.claim_sync(config_id).await? {
            return Err(SyncError::conflict(format!(
                "a sync is already in progress for organization {}",
                config.organization_name
            )));
        }

        let run = match self.store.start_run(config_id, sync_type).await {
            Ok(run) => run,
            Err(e) => {
                if let Err(release_err) = self.store.release_sync(config_id).await {
                    warn!(error = %release_err, %config_id, "failed to release sync guard");
                }
                return Err(e);
            }
        };

        info!(run_id = %run.id, %sync_type, organization = %config.organization_name, "sync run started");

        let outcome =
            tokio::time::timeout(self.run_timeout, self.execute(&config, sync_type)).await;

        let (status, counts, errors) = match outcome {
            Ok(Ok(report)) => (report.status(), report.counts, report.errors),
            Ok(Err(e)) => {
                warn!(run_id = %run.id, error = %e, "sync run aborted");
                (
                    RunStatus::Failed,
                    SyncCounts::default(),
                    vec![ItemError::phase(primary_kind(sync_type), e.to_string())],
                )
            }
            Err(_) => {
                warn!(run_id = %run.id, "sync run timed out");
                (
                    RunStatus::Failed,
                    SyncCounts::default(),
                    vec![ItemError::phase(
                        primary_kind(sync_type),
                        "sync run timed out",
                    )],
                )
            }
        };

        let finalized = self.store.finalize_run(run.id, status, counts, &errors).await;

        if status != RunStatus::Failed {
            if let Err(e) = self.store.touch_last_sync(config_id).await {
                warn!(error = %e, %config_id, "failed to record last sync time");
            }
        }

        // Release is unconditional; the guard never outlives the run.
        let released = self.store.release_sync(config_id).await;
        if let Err(e) = &released {
            warn!(error = %e, %config_id, "failed to release sync guard");
        }

        let run = finalized?;
        released?;

        info!(
            run_id = %run.id,
            status = %run.status,
            created = run.counts.created,
            updated = run.counts.updated,
            skipped = run.counts.skipped,
            errors = run.errors.len(),
            "sync run finished"
        );
        Ok(run)
    }

    async fn execute(
        &self,
        config: &OrgSyncConfig,
        sync_type: SyncType,
    ) -> SyncResult<PhaseReport> {
        let password = self.store.decrypt_password(config)?;
        let client = self
            .registry
            .create(RegistryCredentials::new(config.username.clone(), password))?;
        let reconciler = Reconciler::new(
            self.store.as_ref(),
            self.local.as_ref(),
            config.id,
            config.organization_id,
        );

        let mut report = PhaseReport::default();
        match sync_type {
            SyncType::Teams => {
                self.teams_phase(client.as_ref(), config, &reconciler, &mut report)
                    .await?;
            }
            SyncType::Players => {
                self.players_phase(client.as_ref(), config, &reconciler, &mut report)
                    .await?;
            }
            SyncType::Seasons => {
                self.seasons_phase(client.as_ref(), &reconciler, &mut report)
                    .await?;
            }
            SyncType::Full => {
                // A failed phase is recorded and the next one still runs.
                if let Err(e) = self
                    .teams_phase(client.as_ref(), config, &reconciler, &mut report)
                    .await
                {
                    report
                        .errors
                        .push(ItemError::phase(EntityKind::Team, e.to_string()));
                }
                if let Err(e) = self
                    .players_phase(client.as_ref(), config, &reconciler, &mut report)
                    .await
                {
                    report
                        .errors
                        .push(ItemError::phase(EntityKind::Player, e.to_string()));
                }
                if let Err(e) = self
                    .seasons_phase(client.as_ref(), &reconciler, &mut report)
                    .await
                {
                    report
                        .errors
                        .push(ItemError::phase(EntityKind::Season, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Teams come from `/groups`, filtered to the configured organization.
    async fn teams_phase(
        &self,
        client: &dyn RegistryApi,
        config: &OrgSyncConfig,
        reconciler: &Reconciler<'_>,
        report: &mut PhaseReport,
    ) -> SyncResult<()> {
        let page = client
            .list_groups(&[config.organization_id.to_string()])
            .await?;

        for group in page.items {
            match reconciler
                .reconcile(EntityKind::Team, &group.id, &group.name, &group.attributes)
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(e) => report.errors.push(ItemError::for_remote(
                    EntityKind::Team,
                    group.id,
                    e.to_string(),
                )),
            }
        }
        Ok(())
    }

    /// Players are the contacts of every mapped team, de-duplicated by
    /// remote id. Teams must be synced first; unmapped teams contribute
    /// nothing here.
    async fn players_phase(
        &self,
        client: &dyn RegistryApi,
        config: &OrgSyncConfig,
        reconciler: &Reconciler<'_>,
        report: &mut PhaseReport,
    ) -> SyncResult<()> {
        let team_mappings = self
            .store
            .list_mappings(config.organization_id, EntityKind::Team)
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        for mapping in team_mappings {
            let page = match client.group_contacts(&mapping.remote_id, None).await {
                Ok(page) => page,
                Err(e) => {
                    report.errors.push(ItemError::phase(
                        EntityKind::Player,
                        format!("contacts for team {}: {e}", mapping.remote_id),
                    ));
                    continue;
                }
            };

            for contact in page.items {
                if !seen.insert(contact.id.clone()) {
                    continue;
                }
                match reconciler
                    .reconcile(
                        EntityKind::Player,
                        &contact.id,
                        &contact.name,
                        &contact.attributes,
                    )
                    .await
                {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => report.errors.push(ItemError::for_remote(
                        EntityKind::Player,
                        contact.id,
                        e.to_string(),
                    )),
                }
            }
        }
        Ok(())
    }

    async fn seasons_phase(
        &self,
        client: &dyn RegistryApi,
        reconciler: &Reconciler<'_>,
        report: &mut PhaseReport,
    ) -> SyncResult<()> {
        let page = client.list_seasons(&[]).await?;

        for season in page.items {
            match reconciler
                .reconcile(
                    EntityKind::Season,
                    &season.id,
                    &season.name,
                    &season.attributes,
                )
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(e) => report.errors.push(ItemError::for_remote(
                    EntityKind::Season,
                    season.id,
                    e.to_string(),
                )),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("run_timeout", &self.run_timeout)
            .finish_non_exhaustive()
    }
}

/// Entity kind an aborted run's error entry is filed under.
fn primary_kind(sync_type: SyncType) -> EntityKind {
    match sync_type {
        SyncType::Players => EntityKind::Player,
        SyncType::Teams | SyncType::Full => EntityKind::Team,
        SyncType::Seasons => EntityKind::Season,
    }
}
