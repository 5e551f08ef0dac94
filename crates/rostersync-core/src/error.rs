//! Sync engine error types.
//!
//! One taxonomy shared by the registry client, the stores and the
//! orchestrator, with transient/permanent classification.

use thiserror::Error;

/// Errors that can occur anywhere in the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad, expired or unrefreshable credentials against the remote registry.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// A remote entity or local record is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The remote registry refused access for the attempted organization.
    #[error("access denied for organization {organization}")]
    AccessDenied { organization: String },

    /// Malformed request to this subsystem.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// Field the validation failure applies to, when known.
        field: Option<String>,
    },

    /// A sync is already running for this organization.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Transport-level failure talking to the remote registry.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential encryption failed.
    #[error("encryption failed: {message}")]
    Encryption { message: String },

    /// Credential decryption failed.
    #[error("decryption failed: {message}")]
    Decryption { message: String },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create an access-denied error.
    pub fn access_denied(organization: impl Into<String>) -> Self {
        Self::AccessDenied {
            organization: organization.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error attached to a specific field.
    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with the underlying transport error attached.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Create a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is transient and a later retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network { .. } | SyncError::Database(_))
    }

    /// Get an error code for classification and logging.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Authentication { .. } => "AUTHENTICATION_FAILED",
            SyncError::NotFound { .. } => "NOT_FOUND",
            SyncError::AccessDenied { .. } => "ACCESS_DENIED",
            SyncError::Validation { .. } => "VALIDATION_FAILED",
            SyncError::Conflict { .. } => "CONFLICT",
            SyncError::Network { .. } => "NETWORK_ERROR",
            SyncError::Encryption { .. } => "ENCRYPTION_FAILED",
            SyncError::Decryption { .. } => "DECRYPTION_FAILED",
            SyncError::Database(_) => "DATABASE_ERROR",
            SyncError::Serialization(_) => "SERIALIZATION_ERROR",
            SyncError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
