//! Per-organization sync configuration with encrypted credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use tracing::instrument;
use uuid::Uuid;

use rostersync_core::{SyncError, SyncResult};

use crate::crypto::CredentialCipher;

/// How often automatic syncs should be scheduled for an organization.
///
/// The scheduler itself lives with the host application; this is a stored
/// setting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFrequency {
    Hourly,
    Daily,
    Weekly,
}

impl SyncFrequency {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFrequency::Hourly => "hourly",
            SyncFrequency::Daily => "daily",
            SyncFrequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for SyncFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(SyncFrequency::Hourly),
            "daily" => Ok(SyncFrequency::Daily),
            "weekly" => Ok(SyncFrequency::Weekly),
            _ => Err(format!("Unknown sync frequency: {s}")),
        }
    }
}

/// One organization's sync settings.
///
/// The credential is stored encrypted and is never decrypted for
/// listing/display; only the orchestrator decrypts it, at run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSyncConfig {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub organization_name: String,
    /// Registry username; the matching password lives in `credential_enc`.
    pub username: String,
    /// Encrypted registry password (`nonce || ciphertext || tag`).
    #[serde(skip_serializing, default)]
    pub credential_enc: Vec<u8>,
    pub sync_enabled: bool,
    pub auto_sync_frequency: Option<SyncFrequency>,
    /// Persisted mutual-exclusion guard; claimed atomically at run start.
    pub sync_in_progress: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating or updating a config.
#[derive(Debug, Clone)]
pub struct SaveConfig {
    pub organization_id: Uuid,
    pub organization_name: String,
    pub username: String,
    pub password: String,
    pub sync_enabled: bool,
    pub auto_sync_frequency: Option<SyncFrequency>,
}

/// Store for organization sync configs.
#[derive(Clone)]
pub struct ConfigStore {
    pool: PgPool,
    cipher: CredentialCipher,
}

impl ConfigStore {
    /// Create a new config store.
    #[must_use]
    pub fn new(pool: PgPool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    /// Encrypt the password and upsert the config by organization id.
    ///
    /// Does not contact the remote system; use `test_connection` on the
    /// service for that.
    #[instrument(skip(self, params))]
    pub async fn save(&self, params: &SaveConfig) -> SyncResult<Uuid> {
        if params.username.trim().is_empty() {
            return Err(SyncError::validation_field(
                "username",
                "registry username must not be empty",
            ));
        }
        if params.password.is_empty() {
            return Err(SyncError::validation_field(
                "password",
                "registry password must not be empty",
            ));
        }

        let credential_enc = self
            .cipher
            .encrypt_string(params.organization_id, &params.password)?;

        let row: (Uuid,) = sqlx::query_as(
            r"
            INSERT INTO org_sync_configs (
                organization_id, organization_name, username, credential_enc,
                sync_enabled, auto_sync_frequency
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (organization_id) DO UPDATE SET
                organization_name = EXCLUDED.organization_name,
                username = EXCLUDED.username,
                credential_enc = EXCLUDED.credential_enc,
                sync_enabled = EXCLUDED.sync_enabled,
                auto_sync_frequency = EXCLUDED.auto_sync_frequency,
                updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(params.organization_id)
        .bind(&params.organization_name)
        .bind(&params.username)
        .bind(&credential_enc)
        .bind(params.sync_enabled)
        .bind(params.auto_sync_frequency.map(|f| f.as_str()))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Get the config for an organization.
    #[instrument(skip(self))]
    pub async fn get(&self, organization_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r"
            SELECT id, organization_id, organization_name, username, credential_enc,
                   sync_enabled, auto_sync_frequency, sync_in_progress, last_sync_at,
                   created_at, updated_at
            FROM org_sync_configs
            WHERE organization_id = $1
            ",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConfigRow::into_config).transpose()
    }

    /// Get a config by its primary key.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, config_id: Uuid) -> SyncResult<Option<OrgSyncConfig>> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r"
            SELECT id, organization_id, organization_name, username, credential_enc,
                   sync_enabled, auto_sync_frequency, sync_in_progress, last_sync_at,
                   created_at, updated_at
            FROM org_sync_configs
            WHERE id = $1
            ",
        )
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ConfigRow::into_config).transpose()
    }

    /// List all configs. Credentials stay encrypted.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> SyncResult<Vec<OrgSyncConfig>> {
        let rows = sqlx::query_as::<_, ConfigRow>(
            r"
            SELECT id, organization_id, organization_name, username, credential_enc,
                   sync_enabled, auto_sync_frequency, sync_in_progress, last_sync_at,
                   created_at, updated_at
            FROM org_sync_configs
            ORDER BY organization_name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConfigRow::into_config).collect()
    }

    /// Delete a config row.
    ///
    /// Run history, conflicts and mappings referencing it are retained for
    /// audit; only the config itself goes away.
    #[instrument(skip(self))]
    pub async fn delete(&self, config_id: Uuid) -> SyncResult<bool> {
        let result = sqlx::query("DELETE FROM org_sync_configs WHERE id = $1")
            .bind(config_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Decrypt the stored registry password for a config.
    pub fn decrypt_password(&self, config: &OrgSyncConfig) -> SyncResult<String> {
        self.cipher
            .decrypt_string(config.organization_id, &config.credential_enc)
    }

    /// Atomically claim the per-organization in-progress guard.
    ///
    /// The claim is a conditional update, never a read-then-write pair, so
    /// it stays correct across process restarts and horizontal scale-out.
    /// Returns false if another sync already holds the guard.
    #[instrument(skip(self))]
    pub async fn claim_sync(&self, config_id: Uuid) -> SyncResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE org_sync_configs
            SET sync_in_progress = TRUE, updated_at = NOW()
            WHERE id = $1 AND sync_in_progress = FALSE
            ",
        )
        .bind(config_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Release the in-progress guard. Unconditional and idempotent.
    #[instrument(skip(self))]
    pub async fn release_sync(&self, config_id: Uuid) -> SyncResult<()> {
        sqlx::query(
            r"
            UPDATE org_sync_configs
            SET sync_in_progress = FALSE, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(config_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a successful sync completion time.
    #[instrument(skip(self))]
    pub async fn touch_last_sync(&self, config_id: Uuid) -> SyncResult<()> {
        sqlx::query(
            r"
            UPDATE org_sync_configs
            SET last_sync_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(config_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

/// Database row for a sync config.
#[derive(Debug, sqlx::FromRow)]
struct ConfigRow {
    id: Uuid,
    organization_id: Uuid,
    organization_name: String,
    username: String,
    credential_enc: Vec<u8>,
    sync_enabled: bool,
    auto_sync_frequency: Option<String>,
    sync_in_progress: bool,
    last_sync_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConfigRow {
    fn into_config(self) -> SyncResult<OrgSyncConfig> {
        let auto_sync_frequency = self
            .auto_sync_frequency
            .map(|s| {
                s.parse::<SyncFrequency>()
                    .map_err(SyncError::internal)
            })
            .transpose()?;

        Ok(OrgSyncConfig {
            id: self.id,
            organization_id: self.organization_id,
            organization_name: self.organization_name,
            username: self.username,
            credential_enc: self.credential_enc,
            sync_enabled: self.sync_enabled,
            auto_sync_frequency,
            sync_in_progress: self.sync_in_progress,
            last_sync_at: self.last_sync_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
