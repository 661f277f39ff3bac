//! # cairn-storage
//!
//! The single entry point the application talks to.
//!
//! [`StorageOrchestrator`] opens the `SQLite` backend (falling back to flat
//! JSON files when it cannot), keeps the current session, and wires the
//! token manager and sync engine together so every change is pushed shortly
//! after it is written.
//!
//! ## Crate Position
//!
//! Depends on `cairn-store`, `cairn-auth` and `cairn-sync`. Used by `cairn-cli`.

#![deny(unsafe_code)]

pub mod errors;
pub mod orchestrator;
pub mod titles;

pub use errors::{Result, StorageError};
pub use orchestrator::{NewMessage, StorageDeps, StorageOrchestrator};
