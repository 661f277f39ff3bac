//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Sections are marked
//! `#[serde(default)]` so a partial `settings.json` is valid.

mod auth;
mod storage;
mod sync;

pub use auth::*;
pub use storage::*;
pub use sync::*;

use serde::{Deserialize, Serialize};

/// Root settings type for Cairn.
///
/// Loaded from `~/.cairn/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "storage": { "listLimit": 50 },
///   "sync": { "debounceMs": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CairnSettings {
    /// Local storage layout and limits.
    pub storage: StorageSettings,
    /// Remote sync behaviour and endpoints.
    pub sync: SyncSettings,
    /// OAuth endpoints and client configuration.
    pub auth: AuthSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
