//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CairnSettings::default()`]
//! 2. If `~/.cairn/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::CairnSettings;

/// Resolve the Cairn home directory (`~/.cairn`).
pub fn cairn_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cairn")
}

/// Resolve the path to the settings file (`~/.cairn/settings.json`).
pub fn settings_path() -> PathBuf {
    cairn_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CairnSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<CairnSettings> {
    let mut settings = load_file_layers(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without the env layer.
fn load_file_layers(path: &Path) -> Result<CairnSettings> {
    let defaults = serde_json::to_value(CairnSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut CairnSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Split out from [`apply_env_overrides`] so the mapping can be exercised
/// without mutating the process environment.
pub fn apply_overrides_from<F>(settings: &mut CairnSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = read_string("CAIRN_DATA_DIR") {
        settings.storage.data_dir = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("CAIRN_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Sync ────────────────────────────────────────────────────────
    if let Some(val) = lookup("CAIRN_SYNC_DEBOUNCE_MS") {
        match parse_u64_range(&val, 0, 3_600_000) {
            Some(v) => settings.sync.debounce_ms = v,
            None => {
                tracing::warn!(key = "CAIRN_SYNC_DEBOUNCE_MS", value = %val, "invalid u64 env var, ignoring");
            }
        }
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(val) = lookup("CAIRN_OAUTH_PORT") {
        match parse_u16_range(&val, 0, 65535) {
            Some(v) => settings.auth.callback_port = v,
            None => {
                tracing::warn!(key = "CAIRN_OAUTH_PORT", value = %val, "invalid u16 env var, ignoring");
            }
        }
    }
    if let Some(v) = read_string("CAIRN_OAUTH_CLIENT_ID") {
        settings.auth.client_id = Some(v);
    }
    if let Some(v) = read_string("CAIRN_OAUTH_CLIENT_SECRET") {
        settings.auth.client_secret = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "sync": {"debounceMs": 5000, "apiBaseUrl": "https://a"}
        });
        let source = serde_json::json!({
            "sync": {"debounceMs": 100}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["sync"]["debounceMs"], 100);
        assert_eq!(merged["sync"]["apiBaseUrl"], "https://a");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"scopes": ["a", "b", "c"]});
        let source = serde_json::json!({"scopes": ["d"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["scopes"], serde_json::json!(["d"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── file layers ─────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_file_layers(path).unwrap();
        let defaults = CairnSettings::default();
        assert_eq!(settings.sync.debounce_ms, defaults.sync.debounce_ms);
        assert_eq!(settings.storage.list_limit, defaults.storage.list_limit);
    }

    #[test]
    fn partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"storage": {"listLimit": 50}, "auth": {"callbackPort": 9000}}"#,
        )
        .unwrap();

        let settings = load_file_layers(&path).unwrap();
        assert_eq!(settings.storage.list_limit, 50);
        assert_eq!(settings.storage.database_file, "cairn.db");
        assert_eq!(settings.auth.callback_port, 9000);
        assert_eq!(settings.auth.timeout_secs, 300);
    }

    #[test]
    fn scopes_are_replaced_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"auth": {"scopes": ["only-this"]}}"#).unwrap();

        let settings = load_file_layers(&path).unwrap();
        assert_eq!(settings.auth.scopes, vec!["only-this".to_string()]);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layers(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply_all_known_keys() {
        let mut settings = CairnSettings::default();
        apply_overrides_from(
            &mut settings,
            vars(&[
                ("CAIRN_DATA_DIR", "/srv/cairn"),
                ("CAIRN_LOG_LEVEL", "debug"),
                ("CAIRN_SYNC_DEBOUNCE_MS", "250"),
                ("CAIRN_OAUTH_PORT", "8765"),
                ("CAIRN_OAUTH_CLIENT_ID", "cid"),
                ("CAIRN_OAUTH_CLIENT_SECRET", "csecret"),
            ]),
        );
        assert_eq!(settings.storage.data_dir.as_deref(), Some("/srv/cairn"));
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.sync.debounce_ms, 250);
        assert_eq!(settings.auth.callback_port, 8765);
        assert_eq!(settings.auth.client_id.as_deref(), Some("cid"));
        assert_eq!(settings.auth.client_secret.as_deref(), Some("csecret"));
    }

    #[test]
    fn invalid_override_values_are_ignored() {
        let mut settings = CairnSettings::default();
        apply_overrides_from(
            &mut settings,
            vars(&[
                ("CAIRN_SYNC_DEBOUNCE_MS", "soon"),
                ("CAIRN_OAUTH_PORT", "99999"),
                ("CAIRN_LOG_LEVEL", ""),
            ]),
        );
        let defaults = CairnSettings::default();
        assert_eq!(settings.sync.debounce_ms, defaults.sync.debounce_ms);
        assert_eq!(settings.auth.callback_port, defaults.auth.callback_port);
        assert_eq!(settings.logging.level, "info");
    }

    // ── parse helpers ───────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 600_000), None);
    }
}
