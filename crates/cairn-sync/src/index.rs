//! JSON index uploaded next to the database blob.
//!
//! Lets another device list remote sessions without downloading the whole
//! database.

use cairn_store::SessionSummary;
use serde::{Deserialize, Serialize};

/// Current index format version.
pub const INDEX_VERSION: u32 = 1;

/// Remote listing of sessions, most recent first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncIndex {
    /// Format version.
    pub version: u32,
    /// When the index was generated (ms since epoch).
    pub updated_at: i64,
    /// Session summaries.
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

impl SyncIndex {
    /// Build an index from local summaries.
    pub fn new(updated_at: i64, sessions: Vec<SessionSummary>) -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at,
            sessions,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
