//! Orchestrator error types.

use cairn_auth::AuthError;
use cairn_store::StoreError;
use cairn_sync::SyncError;
use thiserror::Error;

/// Errors returned by [`crate::StorageOrchestrator`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sign-in, sign-out or token handling failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// An explicit sync failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Credentials and settings need the database backend.
    #[error("credential storage is unavailable: running on the flat-file fallback")]
    CredentialsUnavailable,

    /// Sync needs the database backend.
    #[error("sync is unavailable: running on the flat-file fallback")]
    SyncUnavailable,

    /// An explicit sync was requested while signed out.
    #[error("not signed in; run `cairn auth login` first")]
    NotAuthenticated,

    /// A message was added before any session was created or loaded.
    #[error("no current session")]
    NoCurrentSession,

    /// No session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A rename to an empty title.
    #[error("title must not be empty")]
    EmptyTitle,
}

/// Convenience type alias for orchestrator results.
pub type Result<T> = std::result::Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
