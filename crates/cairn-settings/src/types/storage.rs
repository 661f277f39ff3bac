//! Local storage settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::cairn_home;

/// Where and how local data is kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Data directory. `None` means `~/.cairn`; a leading `~/` is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Embedded database file name, relative to the data directory.
    pub database_file: String,
    /// Flat-file fallback directory name, relative to the data directory.
    pub sessions_dir: String,
    /// Secrets file name, relative to the data directory.
    pub secrets_file: String,
    /// Maximum rows returned by a session listing on the embedded backend.
    pub list_limit: usize,
    /// Maximum summaries kept in the flat-file index.
    pub fallback_index_cap: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: "cairn.db".to_string(),
            sessions_dir: "sessions".to_string(),
            secrets_file: "secrets.json".to_string(),
            list_limit: 200,
            fallback_index_cap: 100,
        }
    }
}

impl StorageSettings {
    /// Resolved data directory.
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.as_deref() {
            None => cairn_home(),
            Some(dir) => match dir.strip_prefix("~/") {
                Some(rest) => {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                    PathBuf::from(home).join(rest)
                }
                None => PathBuf::from(dir),
            },
        }
    }

    /// Path to the embedded database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_path().join(&self.database_file)
    }

    /// Path to the flat-file fallback directory.
    pub fn sessions_path(&self) -> PathBuf {
        self.data_path().join(&self.sessions_dir)
    }

    /// Path to the secrets file.
    pub fn secrets_path(&self) -> PathBuf {
        self.data_path().join(&self.secrets_file)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_data_dir_is_used_verbatim() {
        let settings = StorageSettings {
            data_dir: Some("/var/lib/cairn".into()),
            ..StorageSettings::default()
        };
        assert_eq!(settings.database_path(), PathBuf::from("/var/lib/cairn/cairn.db"));
        assert_eq!(settings.sessions_path(), PathBuf::from("/var/lib/cairn/sessions"));
        assert_eq!(
            settings.secrets_path(),
            PathBuf::from("/var/lib/cairn/secrets.json")
        );
    }

    #[test]
    fn default_data_dir_is_cairn_home() {
        let settings = StorageSettings::default();
        assert_eq!(settings.data_path(), cairn_home());
        assert!(settings.data_path().ends_with(".cairn"));
    }

    #[test]
    fn tilde_is_expanded() {
        let settings = StorageSettings {
            data_dir: Some("~/cairn-data".into()),
            ..StorageSettings::default()
        };
        let path = settings.data_path();
        assert!(path.ends_with("cairn-data"));
        assert!(!path.to_string_lossy().contains('~'));
    }
}
