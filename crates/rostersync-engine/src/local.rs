//! Host-application roster access.
//!
//! The engine never touches the host's player/team/season tables directly;
//! the host implements [`LocalRoster`] and the reconciler works through it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use rostersync_core::{EntityKind, SyncResult};

/// A local roster record as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: Uuid,
    pub name: String,
    /// Host-defined attribute payload, compared against remote attributes
    /// when deciding whether an update is needed.
    pub attributes: Value,
}

/// The host application's roster tables.
#[async_trait]
pub trait LocalRoster: Send + Sync {
    /// Fetch one record by id.
    async fn get(&self, kind: EntityKind, id: Uuid) -> SyncResult<Option<LocalRecord>>;

    /// Best-effort match by normalized name within an organization.
    ///
    /// Callers pass the output of [`normalize_name`].
    async fn find_by_name(
        &self,
        organization_id: Uuid,
        kind: EntityKind,
        normalized_name: &str,
    ) -> SyncResult<Option<LocalRecord>>;

    /// Create a record and return its id.
    async fn create(
        &self,
        organization_id: Uuid,
        kind: EntityKind,
        name: &str,
        attributes: &Value,
    ) -> SyncResult<Uuid>;

    /// Overwrite a record's name and attributes.
    async fn update(
        &self,
        kind: EntityKind,
        id: Uuid,
        name: &str,
        attributes: &Value,
    ) -> SyncResult<()>;
}

/// Normalize a display name for duplicate matching.
///
/// Trims, lowercases and collapses internal whitespace so "  Ada  KERR "
/// and "ada kerr" compare equal.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
