//! Registry client trait seam.
//!
//! The orchestrator consumes [`RegistryApi`] rather than the concrete
//! client so tests can substitute a double at construction time.
//! [`RegistryFactory`] builds one client per organization from that
//! organization's decrypted credentials.

use std::sync::Arc;

use async_trait::async_trait;

use rostersync_core::SyncResult;

use crate::client::RegistryClient;
use crate::config::{RegistryConfig, RegistryCredentials};
use crate::record::{ListPage, RemoteContact, RemoteGroup, RemoteSeason};

/// Operations the sync engine needs from the remote registry.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Authenticate and perform one lightweight read. Nothing is persisted.
    async fn test_connection(&self) -> SyncResult<()>;

    /// List groups, optionally filtered by organization ids.
    async fn list_groups(&self, organization_ids: &[String])
        -> SyncResult<ListPage<RemoteGroup>>;

    /// Point lookup of one group.
    async fn get_group(&self, id: &str) -> SyncResult<RemoteGroup>;

    /// Resolve the contacts of a group, optionally scoped to a season.
    async fn group_contacts(
        &self,
        group_id: &str,
        season_id: Option<&str>,
    ) -> SyncResult<ListPage<RemoteContact>>;

    /// Generic contact list fetch.
    async fn list_contacts(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteContact>>;

    /// Generic season list fetch.
    async fn list_seasons(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteSeason>>;
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn test_connection(&self) -> SyncResult<()> {
        self.authenticate().await?;
        self.check_access().await
    }

    async fn list_groups(
        &self,
        organization_ids: &[String],
    ) -> SyncResult<ListPage<RemoteGroup>> {
        RegistryClient::list_groups(self, organization_ids).await
    }

    async fn get_group(&self, id: &str) -> SyncResult<RemoteGroup> {
        RegistryClient::get_group(self, id).await
    }

    async fn group_contacts(
        &self,
        group_id: &str,
        season_id: Option<&str>,
    ) -> SyncResult<ListPage<RemoteContact>> {
        RegistryClient::group_contacts(self, group_id, season_id).await
    }

    async fn list_contacts(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteContact>> {
        RegistryClient::list_contacts(self, filters).await
    }

    async fn list_seasons(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteSeason>> {
        RegistryClient::list_seasons(self, filters).await
    }
}

/// Builds a registry client for one organization's credentials.
pub trait RegistryFactory: Send + Sync {
    /// Create a client. Called once per sync run.
    fn create(&self, credentials: RegistryCredentials) -> SyncResult<Arc<dyn RegistryApi>>;
}

/// Production factory: real HTTP clients against a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpRegistryFactory {
    config: RegistryConfig,
}

impl HttpRegistryFactory {
    /// Create a factory for the given registry endpoint.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }
}

impl RegistryFactory for HttpRegistryFactory {
    fn create(&self, credentials: RegistryCredentials) -> SyncResult<Arc<dyn RegistryApi>> {
        Ok(Arc::new(RegistryClient::new(
            self.config.clone(),
            credentials,
        )?))
    }
}
