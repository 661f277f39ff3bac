//! # cairn-settings
//!
//! Configuration management with layered sources for Cairn.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CairnSettings::default()`]
//! 2. **User file**: `~/.cairn/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CAIRN_*` overrides (highest priority)
//!
//! Unlike a process-global singleton, settings are loaded once by the
//! binary and passed by reference into the storage orchestrator, so tests
//! can build isolated configurations without touching shared state.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, cairn_home, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
