//! Shared in-memory doubles for engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use rostersync_core::{
    EntityKind, ItemError, Resolution, RunStatus, SyncCounts, SyncError, SyncResult, SyncType,
};
use rostersync_engine::{LocalRecord, LocalRoster, SyncOrchestrator};
use rostersync_registry::{
    ListPage, RegistryApi, RegistryCredentials, RegistryFactory, RemoteContact, RemoteGroup,
    RemoteSeason,
};
use rostersync_store::{
    EntityMapping, NewConflict, OrgSyncConfig, SaveConfig, SyncConflict, SyncRun, SyncStore,
};

// ---------------------------------------------------------------------------
// In-memory SyncStore

#[derive(Default)]
pub struct MemoryStore {
    configs: Mutex<Vec<OrgSyncConfig>>,
    mappings: Mutex<Vec<EntityMapping>>,
    runs: Mutex<Vec<SyncRun>>,
    conflicts: Mutex<Vec<SyncConflict>>,
}

impl MemoryStore {
    pub fn sync_in_progress(&self, config_id: Uuid) -> bool {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == config_id)
            .map(|c| c.sync_in_progress)
            .unwrap_or(false)
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.lock().unwrap().len()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn save_config(&self, params: &SaveConfig) -> SyncResult<Uuid> {
        let mut configs = self.configs.lock().unwrap();
        if let Some(existing) = configs
            .iter_mut()
            .find(|c| c.organization_id == params.organization_id)
        {
            existing.organization_name = params.organization_name.clone();
            existing.username = params.username.clone();
            existing.credential_enc = params.password.as_bytes().to_vec();
            existing.sync_enabled = params.sync_enabled;
            existing.auto_sync_frequency = params.auto_sync_frequency;
            existing.updated_at = Utc::now();
            return Ok(existing.id);
        }

        let config = OrgSyncConfig {
            id: Uuid::new_v4(),
            organization_id: params.organization_id,
            organization_name: params.organization_name.clone(),
            username: params.username.clone(),
            credential_enc: params.password.as_bytes().to_vec(),
            sync_enabled: params.sync_enabled,
            auto_sync_frequency: params.auto_sync_frequency,
            sync_in_progress: false,
            last_sync_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = config.id;
        configs.push(config);
        Ok(id)
    }

    async fn get_config(&self, organization_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.organization_id == organization_id)
            .cloned())
    }

    async fn get_config_by_id(&self, config_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == config_id)
            .cloned())
    }

    async fn get_all_configs(&self) -> SyncResult<Vec<OrgSyncConfig>> {
        Ok(self.configs.lock().unwrap().clone())
    }

    async fn delete_config(&self, config_id: Uuid) -> SyncResult<bool> {
        let mut configs = self.configs.lock().unwrap();
        let before = configs.len();
        configs.retain(|c| c.id != config_id);
        Ok(configs.len() < before)
    }

    fn decrypt_password(&self, config: &OrgSyncConfig) -> SyncResult<String> {
        String::from_utf8(config.credential_enc.clone())
            .map_err(|e| SyncError::decryption(e.to_string()))
    }

    async fn claim_sync(&self, config_id: Uuid) -> SyncResult<bool> {
        let mut configs = self.configs.lock().unwrap();
        match configs.iter_mut().find(|c| c.id == config_id) {
            Some(config) if !config.sync_in_progress => {
                config.sync_in_progress = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_sync(&self, config_id: Uuid) -> SyncResult<()> {
        let mut configs = self.configs.lock().unwrap();
        if let Some(config) = configs.iter_mut().find(|c| c.id == config_id) {
            config.sync_in_progress = false;
        }
        Ok(())
    }

    async fn touch_last_sync(&self, config_id: Uuid) -> SyncResult<()> {
        let mut configs = self.configs.lock().unwrap();
        if let Some(config) = configs.iter_mut().find(|c| c.id == config_id) {
            config.last_sync_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<Option<EntityMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| {
                m.organization_id == organization_id
                    && m.entity_kind == entity_kind
                    && m.remote_id == remote_id
            })
            .cloned())
    }

    async fn list_mappings(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
    ) -> SyncResult<Vec<EntityMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.organization_id == organization_id && m.entity_kind == entity_kind)
            .cloned()
            .collect())
    }

    async fn upsert_mapping(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        local_id: Uuid,
        remote_id: &str,
    ) -> SyncResult<EntityMapping> {
        let mut mappings = self.mappings.lock().unwrap();
        if let Some(existing) = mappings.iter_mut().find(|m| {
            m.organization_id == organization_id
                && m.entity_kind == entity_kind
                && m.remote_id == remote_id
        }) {
            existing.local_id = local_id;
            existing.last_synced_at = Utc::now();
            return Ok(existing.clone());
        }

        let mapping = EntityMapping {
            id: Uuid::new_v4(),
            organization_id,
            entity_kind,
            local_id,
            remote_id: remote_id.to_string(),
            last_synced_at: Utc::now(),
            created_at: Utc::now(),
        };
        mappings.push(mapping.clone());
        Ok(mapping)
    }

    async fn mark_mapping_synced(&self, mapping_id: Uuid) -> SyncResult<()> {
        let mut mappings = self.mappings.lock().unwrap();
        if let Some(mapping) = mappings.iter_mut().find(|m| m.id == mapping_id) {
            mapping.last_synced_at = Utc::now();
        }
        Ok(())
    }

    async fn start_run(&self, config_id: Uuid, sync_type: SyncType) -> SyncResult<SyncRun> {
        let run = SyncRun {
            id: Uuid::new_v4(),
            config_id,
            sync_type,
            status: RunStatus::Running,
            counts: SyncCounts::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.runs.lock().unwrap().push(run.clone());
        Ok(run)
    }

    async fn finalize_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        counts: SyncCounts,
        errors: &[ItemError],
    ) -> SyncResult<SyncRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
            .ok_or_else(|| SyncError::internal(format!("run {run_id} is not running")))?;
        run.status = status;
        run.counts = counts;
        run.errors = errors.to_vec();
        run.completed_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn get_run(&self, run_id: Uuid) -> SyncResult<Option<SyncRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == run_id)
            .cloned())
    }

    async fn latest_run(&self, config_id: Uuid) -> SyncResult<Option<SyncRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.config_id == config_id)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn list_runs(
        &self,
        config_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> SyncResult<Vec<SyncRun>> {
        let mut runs: Vec<SyncRun> = self
            .runs
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.config_id == config_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn create_conflict(&self, conflict: &NewConflict) -> SyncResult<SyncConflict> {
        let conflict = SyncConflict {
            id: Uuid::new_v4(),
            config_id: conflict.config_id,
            organization_id: conflict.organization_id,
            entity_kind: conflict.entity_kind,
            conflict_kind: conflict.conflict_kind,
            local_id: conflict.local_id,
            remote_id: conflict.remote_id.clone(),
            local_snapshot: conflict.local_snapshot.clone(),
            remote_snapshot: conflict.remote_snapshot.clone(),
            resolution: Resolution::Pending,
            resolved_at: None,
            created_at: Utc::now(),
        };
        self.conflicts.lock().unwrap().push(conflict.clone());
        Ok(conflict)
    }

    async fn has_pending_conflict(
        &self,
        organization_id: Uuid,
        entity_kind: EntityKind,
        remote_id: &str,
    ) -> SyncResult<bool> {
        Ok(self.conflicts.lock().unwrap().iter().any(|c| {
            c.organization_id == organization_id
                && c.entity_kind == entity_kind
                && c.remote_id == remote_id
                && c.resolution.is_pending()
        }))
    }

    async fn list_pending_conflicts(
        &self,
        organization_id: Uuid,
    ) -> SyncResult<Vec<SyncConflict>> {
        Ok(self
            .conflicts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.organization_id == organization_id && c.resolution.is_pending())
            .cloned()
            .collect())
    }

    async fn count_pending_conflicts(&self, config_id: Uuid) -> SyncResult<i64> {
        Ok(self
            .conflicts
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.config_id == config_id && c.resolution.is_pending())
            .count() as i64)
    }

    async fn get_conflict(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>> {
        Ok(self
            .conflicts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == conflict_id)
            .cloned())
    }

    async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> SyncResult<SyncConflict> {
        if resolution.is_pending() {
            return Err(SyncError::validation("resolution must pick a winning side"));
        }
        let mut conflicts = self.conflicts.lock().unwrap();
        let conflict = conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| SyncError::not_found("conflict", conflict_id.to_string()))?;
        if !conflict.resolution.is_pending() {
            return Err(SyncError::conflict(format!(
                "conflict {conflict_id} already resolved as {}",
                conflict.resolution
            )));
        }
        conflict.resolution = resolution;
        conflict.resolved_at = Some(Utc::now());
        Ok(conflict.clone())
    }
}

// ---------------------------------------------------------------------------
// In-memory LocalRoster

#[derive(Default)]
pub struct MemoryRoster {
    records: Mutex<HashMap<(EntityKind, Uuid), (Uuid, LocalRecord)>>,
    pub fail_update: AtomicBool,
}

impl MemoryRoster {
    pub fn seed(&self, organization_id: Uuid, kind: EntityKind, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.records.lock().unwrap().insert(
            (kind, id),
            (
                organization_id,
                LocalRecord {
                    id,
                    name: name.to_string(),
                    attributes: json!({"name": name}),
                },
            ),
        );
        id
    }

    pub fn remove(&self, kind: EntityKind, id: Uuid) {
        self.records.lock().unwrap().remove(&(kind, id));
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.records
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn name_of(&self, kind: EntityKind, id: Uuid) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(kind, id))
            .map(|(_, r)| r.name.clone())
    }
}

#[async_trait]
impl LocalRoster for MemoryRoster {
    async fn get(&self, kind: EntityKind, id: Uuid) -> SyncResult<Option<LocalRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(kind, id))
            .map(|(_, r)| r.clone()))
    }

    async fn find_by_name(
        &self,
        organization_id: Uuid,
        kind: EntityKind,
        normalized_name: &str,
    ) -> SyncResult<Option<LocalRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|((k, _), (org, record))| {
                *k == kind
                    && *org == organization_id
                    && rostersync_engine::normalize_name(&record.name) == normalized_name
            })
            .map(|(_, (_, record))| record.clone()))
    }

    async fn create(
        &self,
        organization_id: Uuid,
        kind: EntityKind,
        name: &str,
        attributes: &serde_json::Value,
    ) -> SyncResult<Uuid> {
        let id = Uuid::new_v4();
        self.records.lock().unwrap().insert(
            (kind, id),
            (
                organization_id,
                LocalRecord {
                    id,
                    name: name.to_string(),
                    attributes: attributes.clone(),
                },
            ),
        );
        Ok(id)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        attributes: &serde_json::Value,
    ) -> SyncResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(SyncError::internal("roster update unavailable"));
        }
        let mut records = self.records.lock().unwrap();
        let (_, record) = records
            .get_mut(&(kind, id))
            .ok_or_else(|| SyncError::not_found("local record", id.to_string()))?;
        record.name = name.to_string();
        record.attributes = attributes.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted registry double

#[derive(Default)]
pub struct ScriptedRegistry {
    pub groups: Mutex<Vec<RemoteGroup>>,
    pub contacts_by_group: Mutex<HashMap<String, Vec<RemoteContact>>>,
    pub seasons: Mutex<Vec<RemoteSeason>>,
    pub fail_auth: AtomicBool,
    pub fail_groups: AtomicBool,
    pub fail_contacts: AtomicBool,
    pub fail_seasons: AtomicBool,
    pub hang_groups: AtomicBool,
    pub group_calls: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn set_groups(&self, groups: Vec<RemoteGroup>) {
        *self.groups.lock().unwrap() = groups;
    }

    pub fn set_contacts(&self, group_id: &str, contacts: Vec<RemoteContact>) {
        self.contacts_by_group
            .lock()
            .unwrap()
            .insert(group_id.to_string(), contacts);
    }

    pub fn set_seasons(&self, seasons: Vec<RemoteSeason>) {
        *self.seasons.lock().unwrap() = seasons;
    }
}

#[async_trait]
impl RegistryApi for ScriptedRegistry {
    async fn test_connection(&self) -> SyncResult<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(SyncError::authentication("invalid credentials"));
        }
        Ok(())
    }

    async fn list_groups(
        &self,
        _organization_ids: &[String],
    ) -> SyncResult<ListPage<RemoteGroup>> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_groups.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_groups.load(Ordering::SeqCst) {
            return Err(SyncError::network("Failed to fetch groups"));
        }
        Ok(ListPage::of(self.groups.lock().unwrap().clone()))
    }

    async fn get_group(&self, id: &str) -> SyncResult<RemoteGroup> {
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or_else(|| SyncError::not_found("group", id))
    }

    async fn group_contacts(
        &self,
        group_id: &str,
        _season_id: Option<&str>,
    ) -> SyncResult<ListPage<RemoteContact>> {
        if self.fail_contacts.load(Ordering::SeqCst) {
            return Err(SyncError::network("Failed to fetch contacts"));
        }
        Ok(ListPage::of(
            self.contacts_by_group
                .lock()
                .unwrap()
                .get(group_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn list_contacts(
        &self,
        _filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteContact>> {
        if self.fail_contacts.load(Ordering::SeqCst) {
            return Err(SyncError::network("Failed to fetch contacts"));
        }
        let all: Vec<RemoteContact> = self
            .contacts_by_group
            .lock()
            .unwrap()
            .values()
            .flatten()
            .cloned()
            .collect();
        Ok(ListPage::of(all))
    }

    async fn list_seasons(
        &self,
        _filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteSeason>> {
        if self.fail_seasons.load(Ordering::SeqCst) {
            return Err(SyncError::network("Failed to fetch seasons"));
        }
        Ok(ListPage::of(self.seasons.lock().unwrap().clone()))
    }
}

pub struct ScriptedFactory {
    pub registry: Arc<ScriptedRegistry>,
    pub create_calls: AtomicUsize,
}

impl RegistryFactory for ScriptedFactory {
    fn create(&self, _credentials: RegistryCredentials) -> SyncResult<Arc<dyn RegistryApi>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.registry.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures

pub fn group(id: &str, name: &str) -> RemoteGroup {
    RemoteGroup {
        id: id.to_string(),
        name: name.to_string(),
        attributes: json!({"name": name}),
    }
}

pub fn contact(id: &str, name: &str) -> RemoteContact {
    RemoteContact {
        id: id.to_string(),
        name: name.to_string(),
        attributes: json!({"name": name}),
    }
}

pub fn season(id: &str, name: &str) -> RemoteSeason {
    RemoteSeason {
        id: id.to_string(),
        name: name.to_string(),
        attributes: json!({"name": name}),
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ScriptedRegistry>,
    pub factory: Arc<ScriptedFactory>,
    pub roster: Arc<MemoryRoster>,
    pub orchestrator: SyncOrchestrator,
    pub config_id: Uuid,
    pub organization_id: Uuid,
}

pub async fn env() -> TestEnv {
    let store = Arc::new(MemoryStore::default());
    let registry = Arc::new(ScriptedRegistry::default());
    let factory = Arc::new(ScriptedFactory {
        registry: registry.clone(),
        create_calls: AtomicUsize::new(0),
    });
    let roster = Arc::new(MemoryRoster::default());

    let organization_id = Uuid::new_v4();
    let config_id = store
        .save_config(&SaveConfig {
            organization_id,
            organization_name: "North League".to_string(),
            username: "sync-user".to_string(),
            password: "registry-password".to_string(),
            sync_enabled: true,
            auto_sync_frequency: None,
        })
        .await
        .unwrap();

    let orchestrator = SyncOrchestrator::new(
        store.clone() as Arc<dyn SyncStore>,
        factory.clone() as Arc<dyn RegistryFactory>,
        roster.clone() as Arc<dyn LocalRoster>,
    );

    TestEnv {
        store,
        registry,
        factory,
        roster,
        orchestrator,
        config_id,
        organization_id,
    }
}
