//! Auth error types.

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Token endpoint or userinfo endpoint rejected the request.
    #[error("OAuth error ({status}): {message}")]
    OAuth {
        /// HTTP status code (0 if no response).
        status: u16,
        /// Error description.
        message: String,
    },

    /// No OAuth client id/secret configured.
    #[error(
        "OAuth client credentials are not configured; run `cairn auth client <id> <secret>` \
         or set CAIRN_OAUTH_CLIENT_ID and CAIRN_OAUTH_CLIENT_SECRET"
    )]
    MissingClientCredentials,

    /// The user declined consent in the browser.
    #[error("sign-in was denied: {0}")]
    Denied(String),

    /// The redirect carried a `state` that does not match this attempt.
    #[error("sign-in callback state mismatch; retry sign-in")]
    StateMismatch,

    /// No redirect arrived in time.
    #[error("sign-in timed out after {0}s waiting for the browser redirect")]
    Timeout(u64),

    /// The loopback redirect listener could not be bound.
    #[error("could not listen for the sign-in redirect on port {port}: {message}")]
    CallbackBind {
        /// Requested port.
        port: u16,
        /// OS error description.
        message: String,
    },

    /// No refresh token is stored.
    #[error("not signed in")]
    NotSignedIn,

    /// The system browser could not be launched.
    #[error("could not open browser: {0}")]
    Browser(String),
}

/// Convenience type alias for auth results.
pub type Result<T> = std::result::Result<T, AuthError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_display() {
        let err = AuthError::OAuth {
            status: 401,
            message: "invalid_grant".to_string(),
        };
        assert_eq!(err.to_string(), "OAuth error (401): invalid_grant");
    }

    #[test]
    fn missing_credentials_is_actionable() {
        let msg = AuthError::MissingClientCredentials.to_string();
        assert!(msg.contains("cairn auth client"));
        assert!(msg.contains("CAIRN_OAUTH_CLIENT_ID"));
    }

    #[test]
    fn timeout_display() {
        assert_eq!(
            AuthError::Timeout(300).to_string(),
            "sign-in timed out after 300s waiting for the browser redirect"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let auth_err = AuthError::from(io_err);
        assert!(auth_err.to_string().contains("not found"));
    }
}
