//! Remote sync settings.

use serde::{Deserialize, Serialize};

/// Sync engine behaviour and remote endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Quiet period before a scheduled push fires, in milliseconds.
    pub debounce_ms: u64,
    /// Base URL for metadata and download calls.
    pub api_base_url: String,
    /// Base URL for upload calls.
    pub upload_base_url: String,
    /// Remote name of the database blob.
    pub database_blob_name: String,
    /// Remote name of the JSON listing index.
    pub index_blob_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 5_000,
            api_base_url: "https://www.googleapis.com".to_string(),
            upload_base_url: "https://www.googleapis.com".to_string(),
            database_blob_name: "cairn.db".to_string(),
            index_blob_name: "cairn-index.json".to_string(),
        }
    }
}
