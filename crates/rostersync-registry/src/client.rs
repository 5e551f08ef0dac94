//! Registry HTTP client.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use rostersync_core::{SyncError, SyncResult};

use crate::config::{RegistryConfig, RegistryCredentials};
use crate::record::{
    response_rows, ListPage, MembershipRow, RemoteContact, RemoteGroup, RemoteSeason,
};
use crate::session::Session;

/// Hard ceiling on contact ids per detail request, imposed by the
/// registry's query-string limits.
pub const CONTACT_BATCH_LIMIT: usize = 10;

/// Organization filter carried by a list query, kept as context for
/// access-denied classification.
fn organization_filter(filters: &[(String, String)]) -> Option<&str> {
    filters
        .iter()
        .find(|(key, _)| key.starts_with("organization"))
        .map(|(_, value)| value.as_str())
}

/// HTTP client for the remote organization registry.
///
/// Holds one [`Session`] at a time, replaced wholesale on refresh. Token
/// refresh is lazy: checked immediately before each call, with no
/// de-duplication of concurrent refreshes. The orchestrator never runs two
/// operations concurrently on one client instance; do not share a client
/// across concurrent callers.
pub struct RegistryClient {
    config: RegistryConfig,
    credentials: RegistryCredentials,
    http: Client,
    session: RwLock<Option<Session>>,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.config.base_url)
            .field("username", &self.credentials.username)
            .finish()
    }
}

impl RegistryClient {
    /// Create a client for one organization's credentials.
    pub fn new(config: RegistryConfig, credentials: RegistryCredentials) -> SyncResult<Self> {
        config.validate()?;

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| {
                SyncError::validation(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            credentials,
            http,
            session: RwLock::new(None),
        })
    }

    /// Authenticate against the token endpoint and replace the session.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> SyncResult<()> {
        let url = self.config.url("/authenticate");
        let form = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SyncError::authentication(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::authentication(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            SyncError::authentication(format!("failed to parse token response: {e}"))
        })?;

        let token = body
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::authentication("response did not contain a token"))?;
        let expires_in = body
            .get("expires_in")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(3600);

        let session = Session::new(token, expires_in);
        debug!(expires_at = %session.expires_at(), "registry session established");
        *self.session.write().await = Some(session);

        Ok(())
    }

    /// Re-authenticate if no session is held or the token is inside the
    /// refresh buffer. Called before every other operation.
    pub async fn ensure_authenticated(&self) -> SyncResult<()> {
        {
            let guard = self.session.read().await;
            if let Some(session) = guard.as_ref() {
                if !session.needs_refresh() {
                    return Ok(());
                }
                debug!("registry token inside refresh buffer, re-authenticating");
            }
        }
        self.authenticate().await
    }

    /// Send one authenticated GET, re-authenticating and retrying exactly
    /// once on 401. Returns the status and parsed body; non-success statuses
    /// are classified by the caller.
    async fn request(
        &self,
        resource: &str,
        path: &str,
        query: &[(String, String)],
    ) -> SyncResult<(StatusCode, Value)> {
        self.ensure_authenticated().await?;
        let url = self.config.url(path);
        let mut reauthenticated = false;

        loop {
            let token = {
                let guard = self.session.read().await;
                guard
                    .as_ref()
                    .map(|s| s.token().to_string())
                    .unwrap_or_default()
            };

            let mut request = self.http.get(&url).bearer_auth(&token);
            if !query.is_empty() {
                request = request.query(query);
            }

            let response = request.send().await.map_err(|e| {
                SyncError::network_with_source(format!("Failed to fetch {resource}"), e)
            })?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                warn!(resource, "registry returned 401, re-authenticating once");
                reauthenticated = true;
                self.authenticate().await?;
                continue;
            }

            let body = if status.is_success() {
                response.json().await.map_err(|e| {
                    SyncError::network_with_source(format!("Failed to fetch {resource}"), e)
                })?
            } else {
                Value::Null
            };

            return Ok((status, body));
        }
    }

    /// Classify a non-success status into the shared error taxonomy.
    fn status_error(
        &self,
        resource: &str,
        status: StatusCode,
        lookup_id: Option<&str>,
        organization: Option<&str>,
    ) -> SyncError {
        match status {
            StatusCode::UNAUTHORIZED => {
                SyncError::authentication("registry rejected the token after re-authentication")
            }
            StatusCode::FORBIDDEN => {
                SyncError::access_denied(organization.unwrap_or("unknown"))
            }
            StatusCode::NOT_FOUND if lookup_id.is_some() => {
                SyncError::not_found(resource, lookup_id.unwrap_or_default())
            }
            _ => SyncError::network(format!("Failed to fetch {resource}: HTTP {status}")),
        }
    }

    /// Lightweight connectivity probe.
    #[instrument(skip(self))]
    pub async fn check_access(&self) -> SyncResult<()> {
        let (status, _body) = self.request("organizations", "/organizations", &[]).await?;
        if !status.is_success() {
            return Err(self.status_error("organizations", status, None, None));
        }
        Ok(())
    }

    /// List groups, optionally filtered by organization ids.
    #[instrument(skip(self))]
    pub async fn list_groups(
        &self,
        organization_ids: &[String],
    ) -> SyncResult<ListPage<RemoteGroup>> {
        let query: Vec<(String, String)> = organization_ids
            .iter()
            .map(|id| ("organization-ids[]".to_string(), id.clone()))
            .collect();

        let (status, body) = self.request("groups", "/groups", &query).await?;
        if !status.is_success() {
            return Err(self.status_error(
                "groups",
                status,
                None,
                organization_ids.first().map(String::as_str),
            ));
        }

        let groups: Vec<RemoteGroup> = response_rows(&body)
            .iter()
            .filter_map(RemoteGroup::from_value)
            .collect();
        debug!(count = groups.len(), "fetched registry groups");
        Ok(ListPage::of(groups))
    }

    /// Point lookup of one group.
    ///
    /// The registry answers point lookups with a one-element array; the
    /// first element is extracted here.
    #[instrument(skip(self))]
    pub async fn get_group(&self, id: &str) -> SyncResult<RemoteGroup> {
        if id.trim().is_empty() {
            // Fail fast, no network call.
            return Err(SyncError::validation_field("id", "group id is required"));
        }

        let query = vec![("id".to_string(), id.to_string())];
        let (status, body) = self.request("group", "/groups", &query).await?;
        if !status.is_success() {
            return Err(self.status_error("group", status, Some(id), None));
        }

        response_rows(&body)
            .first()
            .and_then(RemoteGroup::from_value)
            .ok_or_else(|| SyncError::not_found("group", id))
    }

    /// Generic contact list fetch.
    #[instrument(skip(self, filters))]
    pub async fn list_contacts(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteContact>> {
        let (status, body) = self.request("contacts", "/contacts", filters).await?;
        if !status.is_success() {
            return Err(self.status_error("contacts", status, None, organization_filter(filters)));
        }

        Ok(ListPage::of(
            response_rows(&body)
                .iter()
                .filter_map(RemoteContact::from_value)
                .collect(),
        ))
    }

    /// Generic season list fetch.
    #[instrument(skip(self, filters))]
    pub async fn list_seasons(
        &self,
        filters: &[(String, String)],
    ) -> SyncResult<ListPage<RemoteSeason>> {
        let (status, body) = self.request("seasons", "/seasons", filters).await?;
        if !status.is_success() {
            return Err(self.status_error("seasons", status, None, organization_filter(filters)));
        }

        Ok(ListPage::of(
            response_rows(&body)
                .iter()
                .filter_map(RemoteSeason::from_value)
                .collect(),
        ))
    }

    /// Resolve the contacts of a group, optionally scoped to a season.
    ///
    /// Two-phase resolution. Phase 1 asks the server for the combined
    /// group+season query; a 400 means the registry does not support that
    /// filter combination. Phase 2 falls back to raw membership rows,
    /// filters them client-side by season (rows that carry no season marker
    /// are kept), then resolves the surviving contact ids with sequential
    /// detail requests of at most [`CONTACT_BATCH_LIMIT`] ids each.
    ///
    /// The returned `total` is the de-duplicated contact id count,
    /// independent of batch boundaries.
    #[instrument(skip(self))]
    pub async fn group_contacts(
        &self,
        group_id: &str,
        season_id: Option<&str>,
    ) -> SyncResult<ListPage<RemoteContact>> {
        if group_id.trim().is_empty() {
            return Err(SyncError::validation_field(
                "group_id",
                "group id is required",
            ));
        }

        if let Some(season) = season_id {
            let query = vec![
                ("group-ids[]".to_string(), group_id.to_string()),
                ("season-id".to_string(), season.to_string()),
            ];
            let (status, body) = self.request("contacts", "/contacts", &query).await?;
            if status.is_success() {
                return Ok(ListPage::of(
                    response_rows(&body)
                        .iter()
                        .filter_map(RemoteContact::from_value)
                        .collect(),
                ));
            }
            if status != StatusCode::BAD_REQUEST {
                return Err(self.status_error("contacts", status, None, Some(group_id)));
            }
            debug!(
                group_id,
                season, "combined group+season query unsupported, falling back to membership rows"
            );
        }

        let query = vec![("group-ids[]".to_string(), group_id.to_string())];
        let (status, body) = self
            .request("group-contacts", "/group-contacts", &query)
            .await?;
        if !status.is_success() {
            return Err(self.status_error("group-contacts", status, None, Some(group_id)));
        }

        let mut rows: Vec<MembershipRow> = response_rows(&body)
            .iter()
            .filter_map(MembershipRow::from_value)
            .collect();

        if let Some(season) = season_id {
            rows.retain(|row| row.season_id.as_deref().map_or(true, |s| s == season));
        }

        // De-duplicate contact ids preserving first-seen order.
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for row in rows {
            if seen.insert(row.contact_id.clone()) {
                ids.push(row.contact_id);
            }
        }
        let total = ids.len() as u64;

        // Detail batches go out sequentially to respect the registry's
        // rate limits; never issue them in parallel.
        let mut contacts = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(CONTACT_BATCH_LIMIT) {
            let query: Vec<(String, String)> = chunk
                .iter()
                .map(|id| ("contact-ids[]".to_string(), id.clone()))
                .collect();
            let (status, body) = self.request("contacts", "/contacts", &query).await?;
            if !status.is_success() {
                return Err(self.status_error("contacts", status, None, Some(group_id)));
            }
            contacts.extend(
                response_rows(&body)
                    .iter()
                    .filter_map(RemoteContact::from_value),
            );
        }

        info!(
            group_id,
            total,
            resolved = contacts.len(),
            "resolved group contacts"
        );
        Ok(ListPage {
            items: contacts,
            total,
        })
    }
}
