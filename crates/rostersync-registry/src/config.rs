//! Registry client configuration.

use rostersync_core::{SyncError, SyncResult};

/// Connection settings for the remote registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the registry API, without a trailing slash.
    pub base_url: String,

    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl RegistryConfig {
    /// Create a config for the given base URL with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Override the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.base_url.is_empty() {
            return Err(SyncError::validation_field(
                "base_url",
                "registry base URL must not be empty",
            ));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            SyncError::validation_field("base_url", format!("invalid registry base URL: {e}"))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(SyncError::validation_field(
                "base_url",
                format!("registry URL scheme '{scheme}' not allowed; only HTTP(S) permitted"),
            )),
        }
    }

    /// Build a full URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Username/password pair for the registry token endpoint.
///
/// `Debug` never prints the password.
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    /// Create a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
