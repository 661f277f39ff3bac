//! `SQLite` backend for the session store.
//!
//! # Architecture
//!
//! - **[`connection`]**: `r2d2` connection pool with WAL mode, foreign keys and
//!   performance pragmas applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repositories`]**: stateless repository structs; each method takes
//!   `&Connection` and executes SQL.
//! - **[`store`]**: [`SqliteStore`], the async, transactional backend.
//! - **[`merge`]**: newest-wins import from another session database.

pub mod connection;
pub mod merge;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, checkpoint, new_file,
    open_file, open_read_only, verify_pragmas,
};
pub use merge::{MergeStats, is_empty, merge_from, verify_schema};
pub use migrations::{current_version, latest_version, run_migrations};
pub use store::{SqliteStore, SqliteStoreOptions, read_session, write_session};
