//! The storage façade used by the application.
//!
//! [`StorageOrchestrator`] picks a backend once at startup, owns the current
//! session, writes every mutation through to the backend and, when an
//! account is signed in, schedules a debounced push.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cairn_auth::{
    AuthStatus, BrowserLauncher, FileSecretStore, SecretStore, SystemBrowser, TokenManager,
};
use cairn_core::ids::{new_message_id, new_session_id};
use cairn_core::time::{monotonic_after, now_ms};
use cairn_settings::CairnSettings;
use cairn_store::{
    Backend, BackendKind, CredentialInfo, FlatFileStore, Message, Role, Session, SessionMode,
    SessionStore, SessionSummary, Setting, SqliteStore, SqliteStoreOptions,
};
use cairn_sync::{DriveAppDataStore, PullOutcome, RemoteStore, SyncConfig, SyncEngine, SyncIndex};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::errors::{Result, StorageError};
use crate::titles;

/// Injected collaborators.
pub struct StorageDeps {
    /// Where OAuth tokens and client credentials live.
    pub secrets: Arc<dyn SecretStore>,
    /// Remote blob store. `None` uses Drive with the token manager.
    pub remote: Option<Arc<dyn RemoteStore>>,
    /// Opens the authorization URL.
    pub launcher: Arc<dyn BrowserLauncher>,
}

impl StorageDeps {
    /// Production wiring: secrets file under the data dir, Drive, system browser.
    pub fn system(settings: &CairnSettings) -> Self {
        Self {
            secrets: Arc::new(FileSecretStore::new(settings.storage.secrets_path())),
            remote: None,
            launcher: Arc::new(SystemBrowser),
        }
    }
}

/// Fields of a message supplied by the caller. Id and timestamp are assigned.
#[derive(Clone, Debug)]
pub struct NewMessage {
    /// Author.
    pub role: Role,
    /// Text body.
    pub content: String,
    /// Render tag; `text` when absent.
    pub kind: Option<String>,
    /// Opaque payload.
    pub metadata: Option<Value>,
}

impl NewMessage {
    /// Plain text message.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            kind: None,
            metadata: None,
        }
    }
}

/// Session storage, credentials and account sync behind one handle.
pub struct StorageOrchestrator {
    backend: Backend,
    tokens: Arc<TokenManager>,
    sync: Option<Arc<SyncEngine>>,
    current: Mutex<Option<Session>>,
    debounce: Duration,
}

impl std::fmt::Debug for StorageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageOrchestrator")
            .field("backend", &self.backend.kind())
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl StorageOrchestrator {
    /// Open storage as configured.
    ///
    /// Falls back to flat files when the database cannot be opened. If an
    /// account is already signed in, a pull starts in the background.
    #[instrument(skip_all)]
    pub async fn init(settings: &CairnSettings, deps: StorageDeps) -> Result<Self> {
        let backend = open_backend(settings).await?;

        let tokens = Arc::new(TokenManager::new(
            deps.secrets,
            settings.auth.clone(),
            deps.launcher,
        ));

        let sync = match &backend {
            Backend::Embedded(store) => {
                let remote: Arc<dyn RemoteStore> = match deps.remote {
                    Some(remote) => remote,
                    None => Arc::new(DriveAppDataStore::new(tokens.clone(), &settings.sync)),
                };
                let mut config = SyncConfig::from_settings(&settings.sync, &settings.storage);
                config.staging_dir = store.path().parent().map(|dir| dir.join("staging"));
                let engine = SyncEngine::new(store.path(), remote, config);
                if let Err(e) = engine.restore_last_sync().await {
                    warn!(error = %e, "could not read last sync time");
                }
                Some(Arc::new(engine))
            }
            Backend::FlatFile(_) => None,
        };

        let orchestrator = Self {
            backend,
            tokens,
            sync,
            current: Mutex::new(None),
            debounce: Duration::from_millis(settings.sync.debounce_ms),
        };

        if orchestrator.tokens.is_signed_in() {
            if let Some(engine) = orchestrator.sync.clone() {
                drop(tokio::spawn(async move {
                    match engine.pull().await {
                        Ok(outcome) => info!(?outcome, "startup pull finished"),
                        Err(e) => warn!(error = %e, "startup pull failed"),
                    }
                }));
            }
        }

        Ok(orchestrator)
    }

    /// Which backend is active.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Start a new session and make it current.
    pub async fn create_session(
        &self,
        mode: SessionMode,
        project_path: Option<String>,
    ) -> Result<Session> {
        let now = now_ms();
        let session = Session {
            id: new_session_id(),
            title: titles::default_title(mode, now),
            mode,
            project_path,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            plan: None,
        };

        let mut current = self.current.lock().await;
        self.backend.save(&session).await?;
        *current = Some(session.clone());
        drop(current);

        info!(session_id = %session.id, %mode, "session created");
        self.after_mutation();
        Ok(session)
    }

    /// Append a message to the current session and persist the whole session.
    ///
    /// The first user message becomes the title.
    pub async fn add_message(&self, message: NewMessage) -> Result<Message> {
        let mut current = self.current.lock().await;
        let mut session = current.clone().ok_or(StorageError::NoCurrentSession)?;

        let timestamp = monotonic_after(session.updated_at);
        let message = Message {
            id: new_message_id(),
            role: message.role,
            content: message.content,
            kind: message.kind.unwrap_or_else(|| "text".to_string()),
            timestamp,
            metadata: message.metadata,
        };

        let first_user = message.role == Role::User
            && !session.messages.iter().any(|m| m.role == Role::User);
        if first_user {
            if let Some(title) = titles::from_message(&message.content) {
                session.title = title;
            }
        }
        session.messages.push(message.clone());
        session.updated_at = timestamp;

        self.backend.save(&session).await?;
        *current = Some(session);
        drop(current);

        self.after_mutation();
        Ok(message)
    }

    /// The session mutations currently apply to.
    pub async fn current_session(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }

    /// Load a session from the backend and make it current.
    pub async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        let mut current = self.current.lock().await;
        let session = self.backend.load(id).await?;
        if let Some(session) = &session {
            *current = Some(session.clone());
        }
        Ok(session)
    }

    /// Summaries, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.backend.list().await?)
    }

    /// Delete a session. Returns whether it existed.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let mut current = self.current.lock().await;
        let deleted = self.backend.delete(id).await?;
        if current.as_ref().is_some_and(|s| s.id == id) {
            *current = None;
        }
        drop(current);

        if deleted {
            info!(session_id = id, "session deleted");
            self.after_mutation();
        }
        Ok(deleted)
    }

    /// Set a session's title (trimmed, at most 100 characters).
    pub async fn rename_session(&self, id: &str, title: &str) -> Result<Session> {
        let title = titles::for_rename(title).ok_or(StorageError::EmptyTitle)?;

        let mut current = self.current.lock().await;
        let loaded = match current.as_ref().filter(|s| s.id == id) {
            Some(session) => Some(session.clone()),
            None => self.backend.load(id).await?,
        };
        let mut session = loaded.ok_or_else(|| StorageError::SessionNotFound(id.to_string()))?;

        session.title = title;
        session.updated_at = monotonic_after(session.updated_at);
        self.backend.save(&session).await?;
        if current.as_ref().is_some_and(|s| s.id == id) {
            *current = Some(session.clone());
        }
        drop(current);

        self.after_mutation();
        Ok(session)
    }

    /// Delete every session.
    pub async fn clear_all(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        self.backend.clear_all().await?;
        *current = None;
        drop(current);

        info!("all sessions cleared");
        self.after_mutation();
        Ok(())
    }

    /// Delete every session and every stored credential.
    pub async fn full_reset(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        self.backend.clear_all().await?;
        if let Some(store) = self.backend.embedded() {
            let removed = store.clear_credentials().await?;
            info!(credentials = removed, "credentials cleared");
        }
        *current = None;
        drop(current);

        info!("storage reset");
        self.after_mutation();
        Ok(())
    }

    // ── Credentials and settings ─────────────────────────────────────────

    fn embedded(&self) -> Result<&SqliteStore> {
        self.backend
            .embedded()
            .ok_or(StorageError::CredentialsUnavailable)
    }

    /// Store a credential, replacing any previous value.
    pub async fn save_credential(&self, name: &str, value: &str) -> Result<()> {
        self.embedded()?.save_credential(name, value).await?;
        self.after_mutation();
        Ok(())
    }

    /// A credential's value.
    pub async fn get_credential(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .embedded()?
            .get_credential(name)
            .await?
            .map(|c| c.value))
    }

    /// Remove a credential. Returns whether it existed.
    pub async fn delete_credential(&self, name: &str) -> Result<bool> {
        let deleted = self.embedded()?.delete_credential(name).await?;
        if deleted {
            self.after_mutation();
        }
        Ok(deleted)
    }

    /// Credential names and timestamps, never values.
    pub async fn list_credentials(&self) -> Result<Vec<CredentialInfo>> {
        Ok(self.embedded()?.list_credentials().await?)
    }

    /// Store an application setting.
    pub async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.embedded()?.save_setting(key, value).await?;
        self.after_mutation();
        Ok(())
    }

    /// A setting's value.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.embedded()?.get_setting(key).await?.map(|s| s.value))
    }

    /// Remove a setting. Returns whether it existed.
    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let deleted = self.embedded()?.delete_setting(key).await?;
        if deleted {
            self.after_mutation();
        }
        Ok(deleted)
    }

    /// Every stored setting.
    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        Ok(self.embedded()?.list_settings().await?)
    }

    // ── Account and sync ─────────────────────────────────────────────────

    /// Whether an account is signed in, and its name.
    pub fn auth_status(&self) -> Result<AuthStatus> {
        Ok(self.tokens.status()?)
    }

    /// Store the OAuth client identity.
    pub fn set_client_credentials(&self, client_id: &str, client_secret: &str) -> Result<()> {
        Ok(self.tokens.set_client_credentials(client_id, client_secret)?)
    }

    /// Run the browser sign-in, then pull and push.
    ///
    /// Only the sign-in itself can fail. Once tokens are stored the account
    /// is signed in; a failed initial sync is logged and left for the next
    /// mutation or [`Self::sync_now`].
    #[instrument(skip_all)]
    pub async fn sign_in(&self) -> Result<AuthStatus> {
        let status = self.tokens.sign_in().await?;
        if let Some(engine) = &self.sync {
            match engine.pull().await {
                Ok(outcome) => {
                    info!(?outcome, "initial pull after sign-in");
                    if !matches!(outcome, PullOutcome::Skipped) {
                        if let Err(e) = self.refresh_current().await {
                            warn!(error = %e, "reloading current session after pull failed");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "initial pull after sign-in failed"),
            }
            if let Err(e) = engine.push().await {
                warn!(error = %e, "initial push after sign-in failed");
            }
        }
        Ok(status)
    }

    /// Push one last time (failures ignored), then forget the account.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(engine) = &self.sync {
            engine.cancel_pending_push();
            if self.tokens.is_signed_in() {
                if let Err(e) = engine.push().await {
                    warn!(error = %e, "final push before sign-out failed");
                }
            }
        }
        self.tokens.sign_out().await?;
        Ok(())
    }

    /// Pull then push now. Errors are returned.
    #[instrument(skip_all)]
    pub async fn sync_now(&self) -> Result<PullOutcome> {
        let engine = self.signed_in_engine()?;
        engine.cancel_pending_push();
        let outcome = engine.pull().await?;
        engine.push().await?;

        // A merge may have replaced the current session's rows.
        if !matches!(outcome, PullOutcome::Skipped) {
            self.refresh_current().await?;
        }
        Ok(outcome)
    }

    /// Run a waiting debounced push now. Returns whether one was waiting.
    ///
    /// Short-lived processes call this before exiting.
    pub async fn flush_pending_push(&self) -> Result<bool> {
        let Some(engine) = &self.sync else {
            return Ok(false);
        };
        if !engine.has_pending_push() {
            return Ok(false);
        }
        engine.cancel_pending_push();
        engine.push().await?;
        Ok(true)
    }

    /// The session listing stored next to the remote database.
    pub async fn remote_index(&self) -> Result<Option<SyncIndex>> {
        Ok(self.signed_in_engine()?.remote_index().await?)
    }

    /// When the last push or pull finished (ms since epoch).
    pub fn last_sync_time(&self) -> Option<i64> {
        self.sync.as_ref().and_then(|e| e.last_sync_time())
    }

    /// Whether a debounced push is waiting.
    pub fn has_pending_push(&self) -> bool {
        self.sync.as_ref().is_some_and(|e| e.has_pending_push())
    }

    /// Location of the local database, when it is in use.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.backend.embedded().map(|s| s.path().to_path_buf())
    }

    fn signed_in_engine(&self) -> Result<&Arc<SyncEngine>> {
        let engine = self.sync.as_ref().ok_or(StorageError::SyncUnavailable)?;
        if !self.tokens.is_signed_in() {
            return Err(StorageError::NotAuthenticated);
        }
        Ok(engine)
    }

    async fn refresh_current(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        if let Some(id) = current.as_ref().map(|s| s.id.clone()) {
            *current = self.backend.load(&id).await?;
        }
        Ok(())
    }

    fn after_mutation(&self) {
        if let Some(engine) = &self.sync {
            if self.tokens.is_signed_in() {
                engine.schedule_push(self.debounce);
            }
        }
    }
}

/// Open the database, or the flat-file store if that fails.
async fn open_backend(settings: &CairnSettings) -> Result<Backend> {
    let db_path = settings.storage.database_path();
    let options = SqliteStoreOptions {
        list_limit: settings.storage.list_limit,
        ..SqliteStoreOptions::default()
    };

    let opened = tokio::task::spawn_blocking({
        let db_path = db_path.clone();
        move || SqliteStore::open(&db_path, &options)
    })
    .await;

    match opened {
        Ok(Ok(store)) => Ok(Backend::Embedded(store)),
        Ok(Err(e)) => {
            warn!(path = %db_path.display(), error = %e, "database unavailable, using flat-file storage");
            open_fallback(settings).await
        }
        Err(e) => {
            warn!(error = %e, "database open task failed, using flat-file storage");
            open_fallback(settings).await
        }
    }
}

async fn open_fallback(settings: &CairnSettings) -> Result<Backend> {
    let store = FlatFileStore::open(
        &settings.storage.sessions_path(),
        settings.storage.fallback_index_cap,
    )
    .await?;
    Ok(Backend::FlatFile(store))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
