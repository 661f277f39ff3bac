//! OAuth settings.

use serde::{Deserialize, Serialize};

/// Scope granting access to the application-private storage area.
pub const APP_DATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";

/// Authorization server endpoints and client configuration.
///
/// Client credentials set here take priority over those stored with
/// `cairn auth client`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Authorization endpoint opened in the browser.
    pub auth_url: String,
    /// Token endpoint for code and refresh exchanges.
    pub token_url: String,
    /// Endpoint returning the signed-in account's profile.
    pub userinfo_url: String,
    /// Scopes requested during sign-in.
    pub scopes: Vec<String>,
    /// Loopback port for the redirect listener. `0` picks a free port.
    pub callback_port: u16,
    /// How long to wait for the browser redirect.
    pub timeout_secs: u64,
    /// Refresh access tokens this many seconds before they expire.
    pub expiry_buffer_secs: u64,
    /// OAuth client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec![
                APP_DATA_SCOPE.to_string(),
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            callback_port: 53_682,
            timeout_secs: 300,
            expiry_buffer_secs: 60,
            client_id: None,
            client_secret: None,
        }
    }
}
