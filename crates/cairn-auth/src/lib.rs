//! # cairn-auth
//!
//! OAuth 2.0 credentials for the Cairn sync account.
//!
//! - [`manager`]: [`TokenManager`], the token lifecycle (sign-in, refresh, sign-out)
//! - [`oauth`]: authorization URL, code exchange, refresh, userinfo
//! - [`callback`]: loopback listener that receives the browser redirect
//! - [`secrets`]: [`SecretStore`] with file (0o600) and in-memory implementations
//! - [`pkce`]: PKCE pairs and `state` values
//! - [`browser`]: [`BrowserLauncher`] and the system implementation

#![deny(unsafe_code)]

pub mod browser;
pub mod callback;
pub mod errors;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod secrets;

pub use browser::{BrowserLauncher, SystemBrowser};
pub use errors::{AuthError, Result};
pub use manager::{AccessTokenProvider, AuthStatus, TokenManager};
pub use pkce::{PkcePair, generate_pkce};
pub use secrets::{FileSecretStore, MemorySecretStore, SecretStore};
