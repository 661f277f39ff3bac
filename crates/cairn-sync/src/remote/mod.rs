//! Remote object storage.
//!
//! Blobs are addressed by name within an application-private space. Bytes
//! are uploaded and downloaded verbatim.

mod drive;
mod memory;

pub use drive::DriveAppDataStore;
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;

/// Metadata of a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Store-assigned id.
    pub id: String,
    /// Blob name.
    pub name: String,
    /// Last modification as reported by the store (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    /// Size in bytes, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Blob operations the sync engine needs.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look a blob up by name.
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>>;

    /// Download a blob's bytes.
    async fn download(&self, id: &str) -> Result<Vec<u8>>;

    /// Create a new blob.
    async fn create(&self, name: &str, mime: &str, bytes: Vec<u8>) -> Result<RemoteFile>;

    /// Overwrite an existing blob's bytes.
    async fn update(&self, id: &str, mime: &str, bytes: Vec<u8>) -> Result<RemoteFile>;
}
