//! Secret persistence for tokens and OAuth client credentials.
//!
//! [`FileSecretStore`] keeps a flat JSON object at `<data_dir>/secrets.json`
//! with 0o600 permissions. [`MemorySecretStore`] is for tests and for
//! callers that manage persistence themselves.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::errors::Result;

/// Stored OAuth access token.
pub const ACCESS_TOKEN: &str = "sync.accessToken";
/// Stored OAuth refresh token.
pub const REFRESH_TOKEN: &str = "sync.refreshToken";
/// Access token expiry, ms since epoch, as a decimal string.
pub const EXPIRES_AT: &str = "sync.expiresAt";
/// Signed-in account's display name.
pub const DISPLAY_NAME: &str = "sync.displayName";
/// OAuth client id configured by the user.
pub const CLIENT_ID: &str = "sync.clientId";
/// OAuth client secret configured by the user.
pub const CLIENT_SECRET: &str = "sync.clientSecret";

/// Keys removed on sign-out. Client credentials survive.
pub const SESSION_KEYS: &[&str] = &[ACCESS_TOKEN, REFRESH_TOKEN, EXPIRES_AT, DISPLAY_NAME];

/// Key/value secret storage.
pub trait SecretStore: Send + Sync {
    /// Read one secret.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write one secret.
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove one secret. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Secrets in a JSON file with owner-only permissions.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    /// Store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to parse secrets file, starting empty: {e}");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let _ = map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Secrets held in process memory.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _ = self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _ = self.map.lock().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("nested/secrets.json"));
        assert!(store.get(REFRESH_TOKEN).unwrap().is_none());

        store.set(REFRESH_TOKEN, "rt-1").unwrap();
        store.set(DISPLAY_NAME, "Ada").unwrap();
        assert_eq!(store.get(REFRESH_TOKEN).unwrap().as_deref(), Some("rt-1"));

        store.delete(REFRESH_TOKEN).unwrap();
        store.delete(REFRESH_TOKEN).unwrap();
        assert!(store.get(REFRESH_TOKEN).unwrap().is_none());
        assert_eq!(store.get(DISPLAY_NAME).unwrap().as_deref(), Some("Ada"));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        FileSecretStore::new(&path).set(CLIENT_ID, "cid").unwrap();
        assert_eq!(
            FileSecretStore::new(&path).get(CLIENT_ID).unwrap().as_deref(),
            Some("cid")
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_store_sets_permissions_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets.json"));
        store.set(ACCESS_TOKEN, "at").unwrap();
        let perms = std::fs::metadata(store.path()).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, "{oops").unwrap();
        let store = FileSecretStore::new(&path);
        assert!(store.get(ACCESS_TOKEN).unwrap().is_none());
        store.set(ACCESS_TOKEN, "at").unwrap();
        assert_eq!(store.get(ACCESS_TOKEN).unwrap().as_deref(), Some("at"));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySecretStore::new();
        store.set(EXPIRES_AT, "123").unwrap();
        assert_eq!(store.get(EXPIRES_AT).unwrap().as_deref(), Some("123"));
        store.delete(EXPIRES_AT).unwrap();
        assert!(store.get(EXPIRES_AT).unwrap().is_none());
    }

    #[test]
    fn session_keys_exclude_client_credentials() {
        assert!(!SESSION_KEYS.contains(&CLIENT_ID));
        assert!(!SESSION_KEYS.contains(&CLIENT_SECRET));
    }
}
