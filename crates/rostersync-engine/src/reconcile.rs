//! Per-record reconciliation.
//!
//! Decides, for one remote record, whether to create, update, skip or
//! quarantine. Mapping state drives the decision; name matching is only a
//! duplicate heuristic and never auto-links.

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use rostersync_core::{ConflictKind, EntityKind, SyncResult};
use rostersync_store::{NewConflict, SyncStore};

use crate::local::{normalize_name, LocalRecord, LocalRoster};

/// What happened to one remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A local record and mapping were created.
    Created,
    /// The mapped local record was overwritten with remote data.
    Updated,
    /// Nothing to do: data already matches, or a pending conflict blocks
    /// this remote id.
    Skipped,
    /// A duplicate-name conflict was quarantined for review.
    Conflict(Uuid),
}

/// Reconciles remote records of one organization against local state.
pub struct Reconciler<'a> {
    store: &'a dyn SyncStore,
    local: &'a dyn LocalRoster,
    config_id: Uuid,
    organization_id: Uuid,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler scoped to one config/organization.
    #[must_use]
    pub fn new(
        store: &'a dyn SyncStore,
        local: &'a dyn LocalRoster,
        config_id: Uuid,
        organization_id: Uuid,
    ) -> Self {
        Self {
            store,
            local,
            config_id,
            organization_id,
        }
    }

    /// Reconcile one remote record.
    pub async fn reconcile(
        &self,
        kind: EntityKind,
        remote_id: &str,
        name: &str,
        attributes: &Value,
    ) -> SyncResult<ReconcileOutcome> {
        if let Some(mapping) = self
            .store
            .find_mapping(self.organization_id, kind, remote_id)
            .await?
        {
            return self
                .reconcile_mapped(kind, remote_id, name, attributes, mapping.id, mapping.local_id)
                .await;
        }

        // A pending conflict quarantines the remote id: no mapping, no
        // writes, until a reviewer resolves it.
        if self
            .store
            .has_pending_conflict(self.organization_id, kind, remote_id)
            .await?
        {
            debug!(%kind, remote_id, "remote record blocked by pending conflict");
            return Ok(ReconcileOutcome::Skipped);
        }

        if let Some(existing) = self
            .local
            .find_by_name(self.organization_id, kind, &normalize_name(name))
            .await?
        {
            return self
                .quarantine_duplicate(kind, remote_id, name, attributes, &existing)
                .await;
        }

        let local_id = self
            .local
            .create(self.organization_id, kind, name, attributes)
            .await?;
        self.store
            .upsert_mapping(self.organization_id, kind, local_id, remote_id)
            .await?;
        info!(%kind, remote_id, %local_id, "created local record from remote");
        Ok(ReconcileOutcome::Created)
    }

    async fn reconcile_mapped(
        &self,
        kind: EntityKind,
        remote_id: &str,
        name: &str,
        attributes: &Value,
        mapping_id: Uuid,
        local_id: Uuid,
    ) -> SyncResult<ReconcileOutcome> {
        match self.local.get(kind, local_id).await? {
            Some(record) if record.name == name && record.attributes == *attributes => {
                self.store.mark_mapping_synced(mapping_id).await?;
                Ok(ReconcileOutcome::Skipped)
            }
            Some(_) => {
                self.local.update(kind, local_id, name, attributes).await?;
                self.store.mark_mapping_synced(mapping_id).await?;
                debug!(%kind, remote_id, %local_id, "updated local record from remote");
                Ok(ReconcileOutcome::Updated)
            }
            None => {
                // The mapped local record was deleted out from under us;
                // recreate it and repoint the mapping.
                warn!(%kind, remote_id, %local_id, "mapped local record missing, recreating");
                let new_id = self
                    .local
                    .create(self.organization_id, kind, name, attributes)
                    .await?;
                self.store
                    .upsert_mapping(self.organization_id, kind, new_id, remote_id)
                    .await?;
                Ok(ReconcileOutcome::Created)
            }
        }
    }

    async fn quarantine_duplicate(
        &self,
        kind: EntityKind,
        remote_id: &str,
        name: &str,
        attributes: &Value,
        existing: &LocalRecord,
    ) -> SyncResult<ReconcileOutcome> {
        let conflict = self
            .store
            .create_conflict(&NewConflict {
                config_id: self.config_id,
                organization_id: self.organization_id,
                entity_kind: kind,
                conflict_kind: ConflictKind::Duplicate,
                local_id: Some(existing.id),
                remote_id: remote_id.to_string(),
                local_snapshot: serde_json::to_value(existing)?,
                remote_snapshot: json!({
                    "id": remote_id,
                    "name": name,
                    "attributes": attributes,
                }),
            })
            .await?;

        warn!(
            %kind,
            remote_id,
            local_id = %existing.id,
            conflict_id = %conflict.id,
            "duplicate name quarantined as conflict"
        );
        Ok(ReconcileOutcome::Conflict(conflict.id))
    }
}
