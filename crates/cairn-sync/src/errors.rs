//! Sync error types.

use std::path::PathBuf;

use cairn_auth::AuthError;
use cairn_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An explicit sync was requested without a signed-in account.
    #[error("not signed in to a sync account")]
    NotAuthenticated,

    /// Obtaining an access token failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an error status.
    #[error("remote storage error ({status}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body or description.
        message: String,
    },

    /// Local database failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// There is no local database file to push.
    #[error("local database not found at {0}")]
    MissingDatabase(PathBuf),

    /// Internal error (e.g. a panicked blocking task).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for sync results.
pub type Result<T> = std::result::Result<T, SyncError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
