//! In-process [`RemoteStore`] for tests and offline use.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cairn_core::time::now_ms;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use super::{RemoteFile, RemoteStore};
use crate::errors::{Result, SyncError};

#[derive(Clone, Debug)]
struct Blob {
    name: String,
    bytes: Vec<u8>,
    modified_at: i64,
}

/// Blobs kept in memory, with counters for assertions.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    blobs: Mutex<BTreeMap<String, Blob>>,
    next_id: AtomicUsize,
    uploads: Mutex<BTreeMap<String, usize>>,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as a network error would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Bytes of the blob called `name`.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .values()
            .find(|b| b.name == name)
            .map(|b| b.bytes.clone())
    }

    /// Create or overwrite a blob directly, bypassing counters.
    pub fn put(&self, name: &str, bytes: Vec<u8>) {
        let mut blobs = self.blobs.lock();
        if let Some(blob) = blobs.values_mut().find(|b| b.name == name) {
            blob.bytes = bytes;
            blob.modified_at = now_ms();
            return;
        }
        let id = self.allocate_id();
        let _ = blobs.insert(
            id,
            Blob {
                name: name.to_string(),
                bytes,
                modified_at: now_ms(),
            },
        );
    }

    /// How many times `name` was created or updated through the trait.
    pub fn upload_count(&self, name: &str) -> usize {
        self.uploads.lock().get(name).copied().unwrap_or(0)
    }

    fn allocate_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Remote {
                status: 503,
                message: "remote store offline".into(),
            });
        }
        Ok(())
    }

    fn record_upload(&self, name: &str) {
        *self.uploads.lock().entry(name.to_string()).or_default() += 1;
    }
}

fn describe(id: &str, blob: &Blob) -> RemoteFile {
    RemoteFile {
        id: id.to_string(),
        name: blob.name.clone(),
        modified_time: Utc
            .timestamp_millis_opt(blob.modified_at)
            .single()
            .map(|dt| dt.to_rfc3339()),
        size: u64::try_from(blob.bytes.len()).ok(),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>> {
        self.check_online()?;
        Ok(self
            .blobs
            .lock()
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(id, b)| describe(id, b)))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.check_online()?;
        self.blobs
            .lock()
            .get(id)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| SyncError::Remote {
                status: 404,
                message: format!("no blob {id}"),
            })
    }

    async fn create(&self, name: &str, _mime: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        self.check_online()?;
        let id = self.allocate_id();
        let blob = Blob {
            name: name.to_string(),
            bytes,
            modified_at: now_ms(),
        };
        let file = describe(&id, &blob);
        let _ = self.blobs.lock().insert(id, blob);
        self.record_upload(name);
        Ok(file)
    }

    async fn update(&self, id: &str, _mime: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        self.check_online()?;
        let mut blobs = self.blobs.lock();
        let blob = blobs.get_mut(id).ok_or_else(|| SyncError::Remote {
            status: 404,
            message: format!("no blob {id}"),
        })?;
        blob.bytes = bytes;
        blob.modified_at = now_ms();
        let file = describe(id, blob);
        drop(blobs);
        self.record_upload(&file.name);
        Ok(file)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
