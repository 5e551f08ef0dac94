//! Access-token session state.

use chrono::{DateTime, Duration, Utc};

/// Safety buffer before token expiry, in seconds.
///
/// A token expiring inside this window is treated as already expired so a
/// request never goes out with a token that dies mid-flight.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// An authenticated session against the registry.
///
/// Immutable: re-authentication replaces the whole value, it never mutates
/// an existing one.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session from the token endpoint's response fields.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Create a session with an explicit expiry instant.
    #[must_use]
    pub fn with_expiry(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check whether the session must be refreshed before the next call.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// Refresh check against an explicit clock (testable form).
    #[must_use]
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(REFRESH_BUFFER_SECS)
    }
}
