//! High-level async API over the `SQLite` repositories.
//!
//! Every write runs inside a single transaction on a pooled connection, so
//! callers never observe a partially written message list. Blocking
//! database work is moved onto the blocking thread pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cairn_core::time::now_ms;
use rusqlite::Connection;
use tracing::{debug, info, instrument};

use crate::contract::SessionStore;
use crate::errors::{Result, StoreError};
use crate::model::{Credential, CredentialInfo, Session, SessionSummary, Setting};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::kv::{KvRepo, KvTable};
use crate::sqlite::repositories::message::MessageRepo;
use crate::sqlite::repositories::session::SessionRepo;

/// Options for opening a [`SqliteStore`].
#[derive(Clone, Debug)]
pub struct SqliteStoreOptions {
    /// Pool and pragma configuration.
    pub connection: ConnectionConfig,
    /// Maximum rows returned by [`SessionStore::list`].
    pub list_limit: usize,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            list_limit: 200,
        }
    }
}

/// Write a full session (header and messages) on `conn`.
///
/// Not atomic on its own; callers wrap it in a transaction.
pub fn write_session(conn: &Connection, session: &Session) -> Result<()> {
    SessionRepo::upsert(conn, session)?;
    MessageRepo::replace_all(conn, &session.id, &session.messages)
}

/// Read a full session (header and messages) from `conn`.
pub fn read_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let Some(mut session) = SessionRepo::get(conn, id)? else {
        return Ok(None);
    };
    session.messages = MessageRepo::list_for_session(conn, id)?;
    Ok(Some(session))
}

/// Embedded database backend.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
    path: PathBuf,
    list_limit: usize,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("list_limit", &self.list_limit)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    ///
    /// Any failure is returned as an error: a bad path, a file that is not
    /// a database, a permission problem or a failed migration.
    pub fn open(path: &Path, options: &SqliteStoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // Probe with a single connection first so an unusable file fails
        // immediately instead of after the pool's connection timeout.
        let probe = connection::open_file(path, &options.connection)?;
        let applied = run_migrations(&probe)?;
        drop(probe);

        let pool = connection::new_file(path, &options.connection)?;
        info!(path = %path.display(), applied, "opened session database");
        Ok(Self {
            pool,
            path: path.to_path_buf(),
            list_limit: options.list_limit,
        })
    }

    /// Database file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a pooled connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("database task failed: {e}")))?
    }

    /// Fold the WAL into the main file so the file bytes are self-contained.
    pub async fn checkpoint(&self) -> Result<()> {
        self.with_conn(connection::checkpoint).await
    }

    /// Number of stored sessions.
    pub async fn session_count(&self) -> Result<i64> {
        self.with_conn(SessionRepo::count).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────

    /// Create or overwrite a credential.
    pub async fn save_credential(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = (name.to_string(), value.to_string());
        self.with_conn(move |conn| KvRepo::put(conn, KvTable::Credentials, &name, &value, now_ms()))
            .await
    }

    /// Look up a credential.
    pub async fn get_credential(&self, name: &str) -> Result<Option<Credential>> {
        let name = name.to_string();
        let row = self
            .with_conn(move |conn| KvRepo::get(conn, KvTable::Credentials, &name))
            .await?;
        Ok(row.map(|r| Credential {
            name: r.key,
            value: r.value,
            updated_at: r.updated_at,
        }))
    }

    /// Delete one credential. Returns whether it existed.
    pub async fn delete_credential(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| KvRepo::delete(conn, KvTable::Credentials, &name))
            .await
    }

    /// Credential names and timestamps. Values are not returned.
    pub async fn list_credentials(&self) -> Result<Vec<CredentialInfo>> {
        let rows = self
            .with_conn(|conn| KvRepo::list(conn, KvTable::Credentials))
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CredentialInfo {
                name: r.key,
                updated_at: r.updated_at,
            })
            .collect())
    }

    /// Delete every credential.
    pub async fn clear_credentials(&self) -> Result<usize> {
        self.with_conn(|conn| KvRepo::delete_all(conn, KvTable::Credentials))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    /// Create or overwrite a setting.
    pub async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| KvRepo::put(conn, KvTable::Settings, &key, &value, now_ms()))
            .await
    }

    /// Look up a setting.
    pub async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let key = key.to_string();
        let row = self
            .with_conn(move |conn| KvRepo::get(conn, KvTable::Settings, &key))
            .await?;
        Ok(row.map(|r| Setting {
            key: r.key,
            value: r.value,
            updated_at: r.updated_at,
        }))
    }

    /// Delete one setting. Returns whether it existed.
    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| KvRepo::delete(conn, KvTable::Settings, &key))
            .await
    }

    /// Every setting.
    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        let rows = self
            .with_conn(|conn| KvRepo::list(conn, KvTable::Settings))
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Setting {
                key: r.key,
                value: r.value,
                updated_at: r.updated_at,
            })
            .collect())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip_all, fields(session_id = %session.id))]
    async fn save(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            write_session(&tx, &session)?;
            tx.commit()?;
            debug!(messages = session.messages.len(), "saved session");
            Ok(())
        })
        .await
    }

    async fn load(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            // Header and messages come from the same snapshot.
            let tx = conn.unchecked_transaction()?;
            let session = read_session(&tx, &id)?;
            tx.commit()?;
            Ok(session)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let limit = self.list_limit;
        self.with_conn(move |conn| SessionRepo::list(conn, limit)).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let _ = MessageRepo::delete_for_session(&tx, &id)?;
            let existed = SessionRepo::delete(&tx, &id)?;
            tx.commit()?;
            Ok(existed)
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let messages = MessageRepo::delete_all(&tx)?;
            let sessions = SessionRepo::delete_all(&tx)?;
            tx.commit()?;
            info!(sessions, messages, "cleared all sessions");
            Ok(())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::model::{Message, Role, SessionMode};

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cairn.db"), &SqliteStoreOptions::default())
            .unwrap();
        (dir, store)
    }

    fn session(id: &str, updated_at: i64, n: usize) -> Session {
        Session {
            id: id.into(),
            title: "t".into(),
            mode: SessionMode::Chat,
            project_path: None,
            created_at: 1,
            updated_at,
            messages: (0..n)
                .map(|i| Message {
                    id: format!("msg_{i}"),
                    role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                    content: format!("message {i}"),
                    kind: "text".into(),
                    timestamp: i64::try_from(i).unwrap(),
                    metadata: None,
                })
                .collect(),
            plan: Some(serde_json::json!({"goal": "ship"})),
        }
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let (_dir, store) = open_temp();
        let s = session("sess_a", 10, 3);
        store.save(&s).await.unwrap();
        assert_eq!(store.load("sess_a").await.unwrap(), Some(s));
        assert!(store.load("sess_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resave_replaces_message_list() {
        let (_dir, store) = open_temp();
        store.save(&session("sess_a", 10, 5)).await.unwrap();
        store.save(&session("sess_a", 11, 2)).await.unwrap();
        let loaded = store.load("sess_a").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.updated_at, 11);
    }

    #[tokio::test]
    async fn list_applies_limit_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteStoreOptions {
            list_limit: 2,
            ..SqliteStoreOptions::default()
        };
        let store = SqliteStore::open(&dir.path().join("cairn.db"), &options).unwrap();
        for (id, ts) in [("sess_a", 1), ("sess_b", 3), ("sess_c", 2)] {
            store.save(&session(id, ts, 1)).await.unwrap();
        }
        let list = store.list().await.unwrap();
        let ids: Vec<_> = list.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["sess_b", "sess_c"]);
    }

    #[tokio::test]
    async fn delete_removes_everything() {
        let (_dir, store) = open_temp();
        store.save(&session("sess_a", 1, 4)).await.unwrap();
        assert!(store.delete("sess_a").await.unwrap());
        assert!(!store.delete("sess_a").await.unwrap());
        assert!(store.load("sess_a").await.unwrap().is_none());
        let orphans = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get::<_, i64>(0))?)
            })
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn clear_all_keeps_credentials() {
        let (_dir, store) = open_temp();
        store.save(&session("sess_a", 1, 1)).await.unwrap();
        store.save_credential("openai", "sk-1").await.unwrap();
        store.clear_all().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get_credential("openai").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn credentials_crud() {
        let (_dir, store) = open_temp();
        store.save_credential("openai", "sk-1").await.unwrap();
        store.save_credential("anthropic", "sk-2").await.unwrap();
        let got = store.get_credential("openai").await.unwrap().unwrap();
        assert_eq!(got.value, "sk-1");

        let names: Vec<_> = store
            .list_credentials()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["anthropic", "openai"]);

        assert!(store.delete_credential("openai").await.unwrap());
        assert_eq!(store.clear_credentials().await.unwrap(), 1);
        assert!(store.list_credentials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_crud() {
        let (_dir, store) = open_temp();
        store.save_setting("theme", "\"dark\"").await.unwrap();
        assert_eq!(store.get_setting("theme").await.unwrap().unwrap().value, "\"dark\"");
        assert_eq!(store.list_settings().await.unwrap().len(), 1);
        assert!(store.delete_setting("theme").await.unwrap());
        assert!(store.get_setting("theme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopen_after_drop_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.db");
        {
            let store = SqliteStore::open(&path, &SqliteStoreOptions::default()).unwrap();
            store.save(&session("sess_a", 7, 2)).await.unwrap();
        }
        let store = SqliteStore::open(&path, &SqliteStoreOptions::default()).unwrap();
        assert_eq!(store.load("sess_a").await.unwrap().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn checkpoint_makes_file_self_contained() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.db");
        let store = SqliteStore::open(&path, &SqliteStoreOptions::default()).unwrap();
        store.save(&session("sess_a", 7, 2)).await.unwrap();
        store.checkpoint().await.unwrap();

        let copy = dir.path().join("copy.db");
        std::fs::copy(&path, &copy).unwrap();
        let conn = connection::open_read_only(&copy).unwrap();
        assert_eq!(SessionRepo::count(&conn).unwrap(), 1);
    }

    #[test]
    fn open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteStore::open(dir.path(), &SqliteStoreOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn open_fails_on_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.db");
        std::fs::write(&path, vec![0x42_u8; 8192]).unwrap();
        assert_matches!(
            SqliteStore::open(&path, &SqliteStoreOptions::default()),
            Err(StoreError::Sqlite(_) | StoreError::Migration { .. })
        );
    }

    #[test]
    fn open_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        assert_matches!(
            SqliteStore::open(&blocker.join("cairn.db"), &SqliteStoreOptions::default()),
            Err(StoreError::Io(_))
        );
    }
}
