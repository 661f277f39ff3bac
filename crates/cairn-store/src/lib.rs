//! # cairn-store
//!
//! Durable local storage for Cairn sessions.
//!
//! - **[`model`]**: sessions, messages, summaries, credentials, settings
//! - **[`contract`]**: the [`SessionStore`] trait and the [`Backend`] chosen at startup
//! - **[`sqlite`]**: the primary backend (pooled `SQLite` in WAL mode) plus the
//!   newest-wins merge used by sync
//! - **[`flatfile`]**: JSON-document fallback used when the database cannot open
//!
//! ## Crate Position
//!
//! Depends on `cairn-core`. Depended on by `cairn-sync` and `cairn-storage`.

#![deny(unsafe_code)]

pub mod contract;
pub mod errors;
pub mod flatfile;
pub mod model;
pub mod sqlite;

pub use contract::{Backend, BackendKind, SessionStore};
pub use errors::{Result, StoreError};
pub use flatfile::FlatFileStore;
pub use model::{
    Credential, CredentialInfo, Message, Role, Session, SessionMode, SessionSummary, Setting,
};
pub use sqlite::{MergeStats, SqliteStore, SqliteStoreOptions};
