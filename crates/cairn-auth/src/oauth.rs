//! OAuth 2.0 authorization-code flow against a Google-style endpoint set.
//!
//! Token requests are form-encoded. Refresh responses may omit the refresh
//! token; the previous one is kept in that case.

use cairn_core::time::now_ms;
use cairn_settings::AuthSettings;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::errors::{AuthError, Result};

/// OAuth client identity.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    /// Client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

/// Tokens returned by the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthTokens {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Long-lived token used to mint new access tokens.
    pub refresh_token: Option<String>,
    /// Access token expiry, ms since epoch.
    pub expires_at: i64,
}

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Absolute expiry for a lifetime in seconds. Saturates on absurd values.
fn expiry_from(expires_in: i64) -> i64 {
    now_ms().saturating_add(expires_in.max(0).saturating_mul(1000))
}

/// Userinfo response. Only the fields used for display are read.
#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Loopback redirect URI for a bound callback port.
pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}/callback")
}

/// Build the authorization URL opened in the browser.
///
/// Requests offline access with forced consent so a refresh token is issued.
pub fn authorization_url(
    settings: &AuthSettings,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}\
         &code_challenge_method=S256&state={}&access_type=offline&prompt=consent",
        settings.auth_url,
        urlencoded(client_id),
        urlencoded(redirect_uri),
        urlencoded(&settings.scopes.join(" ")),
        urlencoded(challenge),
        urlencoded(state),
    )
}

/// Exchange an authorization code for tokens.
#[instrument(skip_all)]
pub async fn exchange_code(
    client: &reqwest::Client,
    settings: &AuthSettings,
    credentials: &ClientCredentials,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
) -> Result<OAuthTokens> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("code_verifier", verifier),
        ("redirect_uri", redirect_uri),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];
    let data = post_token(client, &settings.token_url, &form).await?;
    Ok(OAuthTokens {
        access_token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at: expiry_from(data.expires_in),
    })
}

/// Mint a new access token from a refresh token.
#[instrument(skip_all)]
pub async fn refresh(
    client: &reqwest::Client,
    settings: &AuthSettings,
    credentials: &ClientCredentials,
    refresh_token: &str,
) -> Result<OAuthTokens> {
    info!("refreshing OAuth access token");
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];
    let data = post_token(client, &settings.token_url, &form).await?;
    Ok(OAuthTokens {
        access_token: data.access_token,
        refresh_token: Some(
            data.refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        ),
        expires_at: expiry_from(data.expires_in),
    })
}

/// Display name of the signed-in account: the profile name, else the email.
#[instrument(skip_all)]
pub async fn fetch_display_name(
    client: &reqwest::Client,
    settings: &AuthSettings,
    access_token: &str,
) -> Result<Option<String>> {
    let resp = client
        .get(&settings.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?;
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::OAuth {
            status,
            message: text,
        });
    }
    let info: UserInfo = resp.json().await?;
    Ok(info.name.filter(|n| !n.is_empty()).or(info.email))
}

async fn post_token(
    client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let resp = client.post(token_url).form(form).send().await?;
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::OAuth {
            status,
            message: text,
        });
    }
    Ok(resp.json().await?)
}

/// URL-encode a string for use in query parameters.
fn urlencoded(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn creds() -> ClientCredentials {
        ClientCredentials {
            client_id: "cid".into(),
            client_secret: "csec".into(),
        }
    }

    fn settings_for(server: &MockServer) -> AuthSettings {
        AuthSettings {
            token_url: format!("{}/token", server.uri()),
            userinfo_url: format!("{}/userinfo", server.uri()),
            ..AuthSettings::default()
        }
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let url = authorization_url(
            &AuthSettings::default(),
            "cid",
            &redirect_uri(4242),
            "chal",
            "st4te",
        );
        assert!(url.starts_with("https://accounts.google.com/"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127%2E0%2E0%2E1%3A4242%2Fcallback"));
        assert!(url.contains("code_challenge=chal"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("drive%2Eappdata"));
    }

    #[tokio::test]
    async fn exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=ver"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.a",
                "refresh_token": "rt-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let tokens = exchange_code(
            &client,
            &settings_for(&server),
            &creds(),
            "code-1",
            "ver",
            &redirect_uri(1),
        )
        .await
        .unwrap();
        assert_eq!(tokens.access_token, "ya29.a");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
        assert!(tokens.expires_at > now_ms());
    }

    #[tokio::test]
    async fn refresh_preserves_old_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.b",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let tokens = refresh(&client, &settings_for(&server), &creds(), "rt-keep")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.b");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-keep"));
    }

    #[tokio::test]
    async fn huge_lifetime_saturates_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.c",
                "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let tokens = refresh(&client, &settings_for(&server), &creds(), "rt").await.unwrap();
        assert_eq!(tokens.expires_at, i64::MAX);
    }

    #[test]
    fn negative_lifetime_expires_now() {
        let before = now_ms();
        let at = expiry_from(-30);
        assert!(at >= before && at <= now_ms());
    }

    #[tokio::test]
    async fn token_failure_maps_to_oauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = refresh(&client, &settings_for(&server), &creds(), "rt")
            .await
            .unwrap_err();
        assert_matches!(err, AuthError::OAuth { status: 400, ref message } if message == "invalid_grant");
    }

    #[tokio::test]
    async fn display_name_prefers_name_then_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "", "email": "ada@example.com"
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let name = fetch_display_name(&client, &settings_for(&server), "at-1")
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("ada@example.com"));
    }
}
