//! The session store contract and the startup-selected backend.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;
use crate::flatfile::FlatFileStore;
use crate::model::{Session, SessionSummary};
use crate::sqlite::SqliteStore;

/// Operations every session backend provides.
///
/// `save` is atomic with respect to the session's own message list: a
/// concurrent `load` sees either the old list or the new one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session and its full message list.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Load a session with all its messages.
    async fn load(&self, id: &str) -> Result<Option<Session>>;

    /// Summaries, most recently updated first. Never loads message bodies.
    async fn list(&self) -> Result<Vec<SessionSummary>>;

    /// Delete a session and its messages. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every session.
    async fn clear_all(&self) -> Result<()>;
}

/// Which backend is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `SQLite` database.
    Embedded,
    /// JSON documents on disk.
    FlatFile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embedded => "embedded",
            Self::FlatFile => "flat-file",
        })
    }
}

/// The backend chosen once at startup.
#[derive(Debug)]
pub enum Backend {
    /// Primary backend.
    Embedded(SqliteStore),
    /// Used only when the database could not be opened.
    FlatFile(FlatFileStore),
}

impl Backend {
    /// Which variant this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Embedded(_) => BackendKind::Embedded,
            Self::FlatFile(_) => BackendKind::FlatFile,
        }
    }

    /// The embedded store, when active.
    pub fn embedded(&self) -> Option<&SqliteStore> {
        match self {
            Self::Embedded(store) => Some(store),
            Self::FlatFile(_) => None,
        }
    }
}

#[async_trait]
impl SessionStore for Backend {
    async fn save(&self, session: &Session) -> Result<()> {
        match self {
            Self::Embedded(store) => store.save(session).await,
            Self::FlatFile(store) => store.save(session).await,
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Session>> {
        match self {
            Self::Embedded(store) => store.load(id).await,
            Self::FlatFile(store) => store.load(id).await,
        }
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        match self {
            Self::Embedded(store) => store.list().await,
            Self::FlatFile(store) => store.list().await,
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        match self {
            Self::Embedded(store) => store.delete(id).await,
            Self::FlatFile(store) => store.delete(id).await,
        }
    }

    async fn clear_all(&self) -> Result<()> {
        match self {
            Self::Embedded(store) => store.clear_all().await,
            Self::FlatFile(store) => store.clear_all().await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Role, SessionMode};
    use crate::sqlite::SqliteStoreOptions;

    fn session(id: &str, updated_at: i64) -> Session {
        Session {
            id: id.into(),
            title: "t".into(),
            mode: SessionMode::NewBuild,
            project_path: Some("/tmp/p".into()),
            created_at: 1,
            updated_at,
            messages: vec![Message {
                id: "msg_1".into(),
                role: Role::User,
                content: "héllo ✓".into(),
                kind: "text".into(),
                timestamp: 1,
                metadata: Some(serde_json::json!({"k": [1, 2]})),
            }],
            plan: Some(serde_json::json!({"steps": 2})),
        }
    }

    async fn backends(dir: &std::path::Path) -> Vec<Backend> {
        let embedded =
            SqliteStore::open(&dir.join("cairn.db"), &SqliteStoreOptions::default()).unwrap();
        let flat = FlatFileStore::open(&dir.join("sessions"), 100).await.unwrap();
        vec![Backend::Embedded(embedded), Backend::FlatFile(flat)]
    }

    #[tokio::test]
    async fn both_backends_behave_identically() {
        let dir = tempfile::tempdir().unwrap();
        for backend in backends(dir.path()).await {
            let kind = backend.kind();
            backend.save(&session("sess_a", 1)).await.unwrap();
            backend.save(&session("sess_b", 3)).await.unwrap();
            backend.save(&session("sess_c", 2)).await.unwrap();

            assert_eq!(
                backend.load("sess_a").await.unwrap(),
                Some(session("sess_a", 1)),
                "{kind}"
            );
            let ids: Vec<_> = backend
                .list()
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.id)
                .collect();
            assert_eq!(ids, ["sess_b", "sess_c", "sess_a"], "{kind}");

            assert!(backend.delete("sess_b").await.unwrap(), "{kind}");
            assert!(!backend.delete("sess_b").await.unwrap(), "{kind}");
            backend.clear_all().await.unwrap();
            assert!(backend.list().await.unwrap().is_empty(), "{kind}");
        }
    }

    #[tokio::test]
    async fn kind_and_embedded_accessor() {
        let dir = tempfile::tempdir().unwrap();
        let all = backends(dir.path()).await;
        assert_eq!(all[0].kind(), BackendKind::Embedded);
        assert!(all[0].embedded().is_some());
        assert_eq!(all[1].kind(), BackendKind::FlatFile);
        assert!(all[1].embedded().is_none());
        assert_eq!(BackendKind::FlatFile.to_string(), "flat-file");
    }
}
