//! # cairn-sync
//!
//! Keeps the local session database in step with a copy in app-scoped
//! remote storage.
//!
//! - [`engine`]: [`SyncEngine`] with push, pull, newest-wins merge and a
//!   debounced push
//! - [`remote`]: the [`RemoteStore`] protocol, the Drive `appDataFolder`
//!   client and an in-memory store
//! - [`index`]: the JSON session listing uploaded with each push
//!
//! ## Crate Position
//!
//! Depends on `cairn-store` and `cairn-auth`. Depended on by `cairn-storage`.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod index;
pub mod remote;

pub use engine::{PullOutcome, SyncConfig, SyncEngine};
pub use errors::{Result, SyncError};
pub use index::SyncIndex;
pub use remote::{DriveAppDataStore, MemoryRemoteStore, RemoteFile, RemoteStore};
