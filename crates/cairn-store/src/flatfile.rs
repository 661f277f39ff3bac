//! Flat-file fallback backend.
//!
//! Layout under the sessions directory:
//!
//! ```text
//! <id>.json     full session document (camelCase JSON)
//! index.json    array of summaries, most recent first, capped
//! ```
//!
//! Every write goes to a temp file in the same directory and is renamed
//! into place. Index read-modify-write cycles are serialized by a mutex.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::contract::SessionStore;
use crate::errors::{Result, StoreError};
use crate::model::{Session, SessionSummary};

const INDEX_FILE: &str = "index.json";

/// Session store backed by JSON files.
#[derive(Debug)]
pub struct FlatFileStore {
    dir: PathBuf,
    index_cap: usize,
    index_lock: Mutex<()>,
}

impl FlatFileStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: &Path, index_cap: usize) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            index_cap,
            index_lock: Mutex::new(()),
        })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{id}.json")))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    async fn read_index(&self) -> Result<Vec<SessionSummary>> {
        let path = self.index_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session index is unreadable, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn write_index(&self, index: &[SessionSummary]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes).await
    }
}

/// Reject ids that could escape the sessions directory.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") || id == INDEX_FILE.trim_end_matches(".json") {
        return Err(StoreError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Internal(format!("bad target path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", Uuid::now_v7()));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl SessionStore for FlatFileStore {
    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.id)?;
        write_atomic(&path, &serde_json::to_vec_pretty(session)?).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        index.retain(|s| s.id != session.id);
        index.insert(0, session.summary());
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        index.truncate(self.index_cap);
        self.write_index(&index).await?;
        debug!(session_id = %session.id, "saved session file");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>> {
        let path = self.session_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        self.read_index().await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.session_path(id)?;
        let file_existed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        let before = index.len();
        index.retain(|s| s.id != id);
        let indexed = index.len() != before;
        if indexed {
            self.write_index(&index).await?;
        }
        Ok(file_existed || indexed)
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0_usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        debug!(removed, "cleared session files");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
