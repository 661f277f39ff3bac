//! Push, pull and debounced push of the local database.
//!
//! The whole database file travels as one opaque blob. A push folds the WAL
//! into the main file and uploads its bytes, followed by a JSON index of the
//! session summaries. A pull downloads the blob into a private temp
//! directory, checks it looks like a session database, then merges it into
//! the local file newest-wins. Push and pull never overlap.
//!
//! The time of the last successful sync is kept in the database's
//! `sync_state` table, which merges never copy between devices.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cairn_core::time::now_ms;
use cairn_settings::{StorageSettings, SyncSettings};
use cairn_store::sqlite::connection::ConnectionConfig;
use cairn_store::sqlite::repositories::kv::{KvRepo, KvTable};
use cairn_store::sqlite::repositories::session::SessionRepo;
use cairn_store::sqlite::{
    checkpoint, is_empty, merge_from, open_file, open_read_only, run_migrations, verify_schema,
};
use cairn_store::{MergeStats, SessionSummary, StoreError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{Result, SyncError};
use crate::index::SyncIndex;
use crate::remote::{RemoteFile, RemoteStore};

const DATABASE_MIME: &str = "application/x-sqlite3";
const INDEX_MIME: &str = "application/json";
const LAST_SYNC_KEY: &str = "lastSyncAt";

/// Blob names and local database options used by the engine.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Remote name of the database blob.
    pub database_blob_name: String,
    /// Remote name of the JSON index.
    pub index_blob_name: String,
    /// Pragmas for the engine's own connections.
    pub connection: ConnectionConfig,
    /// Maximum summaries written to the index.
    pub list_limit: usize,
    /// Where pulled blobs are staged before verification. System temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Build from loaded settings.
    pub fn from_settings(sync: &SyncSettings, storage: &StorageSettings) -> Self {
        Self {
            database_blob_name: sync.database_blob_name.clone(),
            index_blob_name: sync.index_blob_name.clone(),
            connection: ConnectionConfig::default(),
            list_limit: storage.list_limit,
            staging_dir: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default(), &StorageSettings::default())
    }
}

/// Result of a pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PullOutcome {
    /// Nothing changed locally.
    Skipped,
    /// The local database was absent or empty and now holds the remote data.
    Replaced,
    /// Newer remote records were merged in.
    Merged(MergeStats),
}

struct PendingPush {
    generation: u64,
    cancel: CancellationToken,
}

/// Synchronizes one local database file with a [`RemoteStore`].
pub struct SyncEngine {
    db_path: PathBuf,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    op_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Option<PendingPush>>,
    generation: AtomicU64,
    last_sync: Mutex<Option<i64>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Engine for the database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            db_path: db_path.into(),
            remote,
            config,
            op_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
            last_sync: Mutex::new(None),
        }
    }

    /// Local database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// When the last successful push or pull finished (ms since epoch).
    pub fn last_sync_time(&self) -> Option<i64> {
        *self.last_sync.lock()
    }

    /// Load the last sync time recorded in the local database, if any.
    pub async fn restore_last_sync(&self) -> Result<Option<i64>> {
        let path = self.db_path.clone();
        let connection = self.config.connection.clone();
        let stored = blocking(move || read_last_sync(&path, &connection)).await?;
        if let Some(at) = stored {
            let mut last = self.last_sync.lock();
            *last = Some(last.map_or(at, |current| current.max(at)));
        }
        Ok(stored)
    }

    /// Upload the local database and a fresh index.
    #[instrument(skip_all)]
    pub async fn push(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;

        let path = self.db_path.clone();
        let connection = self.config.connection.clone();
        let limit = self.config.list_limit;
        let (bytes, sessions) =
            blocking(move || snapshot_local(&path, &connection, limit)).await?;

        let db_len = bytes.len();
        let session_count = sessions.len();
        let index = serde_json::to_vec(&SyncIndex::new(now_ms(), sessions))?;

        let _ = self
            .upload(&self.config.database_blob_name, DATABASE_MIME, bytes)
            .await?;
        let _ = self
            .upload(&self.config.index_blob_name, INDEX_MIME, index)
            .await?;

        self.record_sync().await;
        info!(bytes = db_len, sessions = session_count, "pushed database");
        Ok(())
    }

    /// Download the remote database and fold it into the local one.
    ///
    /// Transport failures are returned. A remote blob that cannot be used
    /// is logged and reported as [`PullOutcome::Skipped`].
    #[instrument(skip_all)]
    pub async fn pull(&self) -> Result<PullOutcome> {
        let _guard = self.op_lock.lock().await;

        let Some(file) = self.remote.find(&self.config.database_blob_name).await? else {
            debug!("no remote database");
            return Ok(PullOutcome::Skipped);
        };
        let bytes = self.remote.download(&file.id).await?;

        let path = self.db_path.clone();
        let connection = self.config.connection.clone();
        let staging = self.config.staging_dir.clone();
        let applied =
            blocking(move || apply_remote_blob(&path, &connection, staging.as_deref(), &bytes)).await;
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "remote database unusable, local data left untouched");
                return Ok(PullOutcome::Skipped);
            }
        };

        self.record_sync().await;
        info!(?outcome, "pulled database");
        Ok(outcome)
    }

    /// Download and parse the remote index, if one exists.
    #[instrument(skip_all)]
    pub async fn remote_index(&self) -> Result<Option<SyncIndex>> {
        let Some(file) = self.remote.find(&self.config.index_blob_name).await? else {
            return Ok(None);
        };
        let bytes = self.remote.download(&file.id).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Push after `delay` unless another call supersedes this one first.
    pub fn schedule_push(self: &Arc<Self>, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let previous = self.pending.lock().replace(PendingPush {
            generation,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let engine = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(generation, "scheduled push superseded");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            {
                let mut pending = engine.pending.lock();
                if pending.as_ref().is_some_and(|p| p.generation == generation) {
                    *pending = None;
                } else {
                    return;
                }
            }

            if let Err(e) = engine.push().await {
                warn!(error = %e, "scheduled push failed");
            }
        }));
    }

    /// Drop the pending scheduled push, if any.
    pub fn cancel_pending_push(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.cancel.cancel();
            debug!(generation = pending.generation, "scheduled push cancelled");
        }
    }

    /// Whether a scheduled push is waiting to fire.
    pub fn has_pending_push(&self) -> bool {
        self.pending.lock().is_some()
    }

    async fn record_sync(&self) {
        let at = now_ms();
        *self.last_sync.lock() = Some(at);
        let path = self.db_path.clone();
        let connection = self.config.connection.clone();
        if let Err(e) = blocking(move || write_last_sync(&path, &connection, at)).await {
            warn!(error = %e, "failed to record last sync time");
        }
    }

    async fn upload(&self, name: &str, mime: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        match self.remote.find(name).await? {
            Some(existing) => self.remote.update(&existing.id, mime, bytes).await,
            None => self.remote.create(name, mime, bytes).await,
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Internal(format!("sync task failed: {e}")))?
}

/// Checkpoint, then read the file bytes and summaries from one snapshot.
fn snapshot_local(
    path: &Path,
    config: &ConnectionConfig,
    limit: usize,
) -> Result<(Vec<u8>, Vec<SessionSummary>)> {
    if !path.exists() {
        return Err(SyncError::MissingDatabase(path.to_path_buf()));
    }
    let conn = open_file(path, config)?;
    checkpoint(&conn)?;

    // The read transaction pins the snapshot: later commits stay in the WAL
    // and no checkpoint can copy them into the file while we read it.
    let tx = conn.unchecked_transaction().map_err(StoreError::from)?;
    let sessions = SessionRepo::list(&tx, limit)?;
    let bytes = std::fs::read(path)?;
    drop(tx);
    Ok((bytes, sessions))
}

fn apply_remote_blob(
    path: &Path,
    config: &ConnectionConfig,
    staging_dir: Option<&Path>,
    bytes: &[u8],
) -> Result<PullOutcome> {
    let staging = match staging_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            tempfile::Builder::new().prefix("cairn-pull-").tempdir_in(dir)?
        }
        None => tempfile::Builder::new().prefix("cairn-pull-").tempdir()?,
    };
    let remote_path = staging.path().join("remote.db");
    std::fs::write(&remote_path, bytes)?;

    let remote = open_read_only(&remote_path)?;
    verify_schema(&remote)?;

    if !path.exists() {
        drop(remote);
        install_blob(path, bytes)?;
        return Ok(PullOutcome::Replaced);
    }

    let local = open_file(path, config)?;
    let _ = run_migrations(&local)?;
    let was_empty = is_empty(&local)?;
    let stats = merge_from(&local, &remote)?;
    debug!(?stats, was_empty, "merged remote database");

    Ok(if stats.is_empty() {
        PullOutcome::Skipped
    } else if was_empty {
        PullOutcome::Replaced
    } else {
        PullOutcome::Merged(stats)
    })
}

fn read_last_sync(path: &Path, config: &ConnectionConfig) -> Result<Option<i64>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = open_file(path, config)?;
    let _ = run_migrations(&conn)?;
    Ok(KvRepo::get(&conn, KvTable::SyncState, LAST_SYNC_KEY)?.map(|row| row.updated_at))
}

fn write_last_sync(path: &Path, config: &ConnectionConfig, at: i64) -> Result<()> {
    let conn = open_file(path, config)?;
    let _ = run_migrations(&conn)?;
    let value = chrono::DateTime::from_timestamp_millis(at)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    KvRepo::put(&conn, KvTable::SyncState, LAST_SYNC_KEY, &value, at)?;
    Ok(())
}

/// Write `bytes` as the database at `path` via a sibling temp file.
fn install_blob(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        match std::fs::remove_file(PathBuf::from(sidecar)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    let _ = tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
