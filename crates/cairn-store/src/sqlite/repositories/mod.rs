//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter. Callers own transaction boundaries: pass a `Transaction`
//! (which derefs to `Connection`) to group several calls atomically.

pub mod kv;
pub mod message;
pub mod session;
