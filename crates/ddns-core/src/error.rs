//! Error types for the DDNS relay
//!
//! One taxonomy is shared by the ledger, the envelope crypto and the
//! orchestrator. The HTTP layer maps each variant onto a status code;
//! nothing in this crate knows about HTTP.

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which authentication channel rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChannel {
    /// Sealed envelope carried in the request body
    Envelope,
    /// `Authorization: Bearer` header on a read-only view
    Bearer,
}

/// Core error type for the DDNS relay
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or invalid input. The message is safe to show to clients.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown user, wrong token or undecryptable payload.
    ///
    /// The reasons are merged on purpose and the variant carries no detail.
    #[error("Authentication failed")]
    AuthenticationFailed(AuthChannel),

    /// Account or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Account already holds `limit` records
    #[error("Domain quota exceeded for '{username}' (limit {limit})")]
    QuotaExceeded {
        /// Account that hit its quota
        username: String,
        /// Configured domain limit
        limit: u32,
    },

    /// Record is owned by another account
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Encryption keys must be exactly 32 bytes
    #[error("Encryption key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Sealed token could not be decoded, was too short, or failed authentication
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Upstream DNS provider failure
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Durable write failed after the in-memory ledger was already mutated
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Durable store could not be loaded
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a store (load-time) error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the failure was caused by the request rather than the relay
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_)
                | Self::AuthenticationFailed(_)
                | Self::NotFound(_)
                | Self::QuotaExceeded { .. }
                | Self::Conflict(_)
                | Self::InvalidKeyLength(_)
                | Self::DecryptionFailed
        )
    }

    /// Message that may be returned to a client
    ///
    /// Provider, persistence and internal details are replaced by a generic
    /// text; they are logged server-side instead.
    pub fn public_message(&self) -> String {
        match self {
            Self::DecryptionFailed | Self::AuthenticationFailed(_) => {
                "Authentication failed".to_string()
            }
            Self::Provider { .. } => "Upstream DNS provider request failed".to_string(),
            Self::Persistence(_) | Self::Store(_) => {
                "Internal error while saving account data".to_string()
            }
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
