//! Token lifecycle: sign-in, cached access tokens, refresh, sign-out.
//!
//! Tokens and the OAuth client identity live in an injected
//! [`SecretStore`]. The in-memory cache is guarded by an async mutex that is
//! held across a refresh, so concurrent callers trigger one refresh only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cairn_core::time::now_ms;
use cairn_settings::AuthSettings;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::browser::BrowserLauncher;
use crate::callback::wait_for_code;
use crate::errors::{AuthError, Result};
use crate::oauth::{self, ClientCredentials, OAuthTokens};
use crate::pkce::{generate_pkce, generate_state};
use crate::secrets::{self, SecretStore};

/// Supplies bearer tokens to remote clients.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// A token valid for at least the configured buffer.
    async fn access_token(&self) -> Result<String>;

    /// Forget any cached token, e.g. after the remote answered 401.
    async fn invalidate(&self) {}
}

/// Whether a remote identity is available.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    /// An access or refresh token is stored.
    pub signed_in: bool,
    /// Account name shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Owns the OAuth credentials for the sync account.
pub struct TokenManager {
    secrets: Arc<dyn SecretStore>,
    settings: AuthSettings,
    client: reqwest::Client,
    launcher: Arc<dyn BrowserLauncher>,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Build a manager over `secrets`.
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        settings: AuthSettings,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            secrets,
            settings,
            client: reqwest::Client::new(),
            launcher,
            cache: Mutex::new(None),
        }
    }

    /// Signed in iff an access or refresh token is stored.
    pub fn status(&self) -> Result<AuthStatus> {
        let signed_in = self.secrets.get(secrets::ACCESS_TOKEN)?.is_some()
            || self.secrets.get(secrets::REFRESH_TOKEN)?.is_some();
        let display_name = if signed_in {
            self.secrets.get(secrets::DISPLAY_NAME)?
        } else {
            None
        };
        Ok(AuthStatus {
            signed_in,
            display_name,
        })
    }

    /// Shorthand for `status()?.signed_in`, treating read errors as signed out.
    pub fn is_signed_in(&self) -> bool {
        self.status().is_ok_and(|s| s.signed_in)
    }

    /// Store the OAuth client identity used for sign-in and refresh.
    pub fn set_client_credentials(&self, client_id: &str, client_secret: &str) -> Result<()> {
        let (client_id, client_secret) = (client_id.trim(), client_secret.trim());
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AuthError::MissingClientCredentials);
        }
        self.secrets.set(secrets::CLIENT_ID, client_id)?;
        self.secrets.set(secrets::CLIENT_SECRET, client_secret)?;
        info!("stored OAuth client credentials");
        Ok(())
    }

    /// Client identity from settings, else from the secret store.
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        let client_id = match self.settings.client_id.clone() {
            Some(id) => Some(id),
            None => self.secrets.get(secrets::CLIENT_ID)?,
        };
        let client_secret = match self.settings.client_secret.clone() {
            Some(secret) => Some(secret),
            None => self.secrets.get(secrets::CLIENT_SECRET)?,
        };
        match (client_id, client_secret) {
            (Some(client_id), Some(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Ok(ClientCredentials {
                    client_id,
                    client_secret,
                })
            }
            _ => Err(AuthError::MissingClientCredentials),
        }
    }

    /// Run the interactive authorization-code flow and persist the result.
    #[instrument(skip_all)]
    pub async fn sign_in(&self) -> Result<AuthStatus> {
        let credentials = self.client_credentials()?;
        let pkce = generate_pkce();
        let state = generate_state();

        let port = self.settings.callback_port;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AuthError::CallbackBind {
                port,
                message: e.to_string(),
            })?;
        let redirect_uri = oauth::redirect_uri(listener.local_addr()?.port());
        let url = oauth::authorization_url(
            &self.settings,
            &credentials.client_id,
            &redirect_uri,
            &pkce.challenge,
            &state,
        );

        info!(%url, "waiting for browser sign-in");
        if let Err(e) = self.launcher.open(&url) {
            warn!(error = %e, "could not open a browser; open the logged URL manually");
        }

        let timeout_secs = self.settings.timeout_secs;
        let code = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            wait_for_code(listener, &state),
        )
        .await
        .map_err(|_| AuthError::Timeout(timeout_secs))??;

        let tokens = oauth::exchange_code(
            &self.client,
            &self.settings,
            &credentials,
            &code,
            &pkce.verifier,
            &redirect_uri,
        )
        .await?;

        let display_name =
            match oauth::fetch_display_name(&self.client, &self.settings, &tokens.access_token)
                .await
            {
                Ok(name) => name,
                Err(e) => {
                    warn!(error = %e, "could not fetch account name");
                    None
                }
            };

        self.persist(&tokens)?;
        match &display_name {
            Some(name) => self.secrets.set(secrets::DISPLAY_NAME, name)?,
            None => self.secrets.delete(secrets::DISPLAY_NAME)?,
        }
        info!(account = display_name.as_deref().unwrap_or("unknown"), "signed in");

        Ok(AuthStatus {
            signed_in: true,
            display_name,
        })
    }

    /// Forget tokens and account name. Client credentials are kept.
    pub async fn sign_out(&self) -> Result<()> {
        let mut cache = self.cache.lock().await;
        for key in secrets::SESSION_KEYS {
            self.secrets.delete(key)?;
        }
        *cache = None;
        info!("signed out");
        Ok(())
    }

    /// Cached or stored access token, refreshing when within the buffer of expiry.
    #[instrument(skip_all)]
    pub async fn access_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        let buffer_ms = i64::try_from(self.settings.expiry_buffer_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        let fresh = |expires_at: i64| now_ms().saturating_add(buffer_ms) < expires_at;

        if let Some(cached) = cache.as_ref().filter(|c| fresh(c.expires_at)) {
            return Ok(cached.access_token.clone());
        }

        if let (Some(token), Some(expires_at)) = (
            self.secrets.get(secrets::ACCESS_TOKEN)?,
            self.stored_expiry()?,
        ) {
            if fresh(expires_at) {
                *cache = Some(CachedToken {
                    access_token: token.clone(),
                    expires_at,
                });
                return Ok(token);
            }
        }

        let refresh_token = self
            .secrets
            .get(secrets::REFRESH_TOKEN)?
            .ok_or(AuthError::NotSignedIn)?;
        let credentials = self.client_credentials()?;
        let tokens =
            oauth::refresh(&self.client, &self.settings, &credentials, &refresh_token).await?;
        self.persist(&tokens)?;
        *cache = Some(CachedToken {
            access_token: tokens.access_token.clone(),
            expires_at: tokens.expires_at,
        });
        Ok(tokens.access_token)
    }

    fn stored_expiry(&self) -> Result<Option<i64>> {
        Ok(self
            .secrets
            .get(secrets::EXPIRES_AT)?
            .and_then(|v| v.parse().ok()))
    }

    fn persist(&self, tokens: &OAuthTokens) -> Result<()> {
        self.secrets.set(secrets::ACCESS_TOKEN, &tokens.access_token)?;
        self.secrets
            .set(secrets::EXPIRES_AT, &tokens.expires_at.to_string())?;
        if let Some(refresh) = &tokens.refresh_token {
            self.secrets.set(secrets::REFRESH_TOKEN, refresh)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> Result<String> {
        TokenManager::access_token(self).await
    }

    async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
        if let Err(e) = self.secrets.set(secrets::EXPIRES_AT, "0") {
            warn!(error = %e, "could not mark access token expired");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
