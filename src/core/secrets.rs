//! Credential and settings storage.
//!
//! A pluggable key-value store scoped by (user id, key). The default backend
//! keeps plain files under the airlift data directory; the keychain backend
//! uses the system credential manager (macOS Keychain, Linux Secret Service,
//! Windows Credential Manager). Writes race under last-write-wins; auth is
//! human-paced, not a hot path.

use crate::error::{Error, Result};
use crate::paths;
use crate::providers::Provider;
use crate::utils::io;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Storage key for the active credential of a provider.
pub fn token_key(provider: Provider) -> String {
    format!("{}.token", provider)
}

/// Storage key for a provenance-tagged credential copy.
pub fn tagged_token_key(provider: Provider, kind: &str) -> String {
    format!("{}.token.{}", provider, kind)
}

/// Storage key for a provider's preference settings document.
pub fn settings_key(provider: Provider) -> String {
    format!("{}.settings", provider)
}

/// Key-value secret backend scoped by (user id, key).
pub trait SecretStore: Send + Sync {
    fn get(&self, user: &str, key: &str) -> Result<Option<String>>;
    fn put(&self, user: &str, key: &str, value: &str) -> Result<()>;
    fn delete(&self, user: &str, key: &str) -> Result<()>;
}

/// Save a credential as the active token for its provider, keeping a
/// provenance-tagged copy for diagnostics. Last successful save wins.
pub fn save_token(
    store: &dyn SecretStore,
    user: &str,
    provider: Provider,
    secret: &str,
    provenance: Option<&str>,
) -> Result<()> {
    store.put(user, &token_key(provider), secret)?;
    if let Some(kind) = provenance {
        store.put(user, &tagged_token_key(provider, kind), secret)?;
    }
    Ok(())
}

pub fn load_token(store: &dyn SecretStore, user: &str, provider: Provider) -> Result<Option<String>> {
    store.get(user, &token_key(provider))
}

/// Remove the active credential and its known provenance copies.
pub fn forget_tokens(store: &dyn SecretStore, user: &str, provider: Provider) -> Result<()> {
    store.delete(user, &token_key(provider))?;
    for kind in ["browser", "manual", "bootstrap"] {
        store.delete(user, &tagged_token_key(provider, kind))?;
    }
    Ok(())
}

/// Resolve the storage scope for the current user.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string())
}

// ============================================================================
// Filesystem backend (default)
// ============================================================================

/// One file per (user, key) under `<data dir>/secrets/<user>/<key>`.
pub struct FsSecretStore {
    root: PathBuf,
}

impl FsSecretStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store under the well-known airlift data directory.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(paths::secrets()?))
    }

    fn entry_path(&self, user: &str, key: &str) -> PathBuf {
        self.root.join(user).join(key)
    }
}

impl SecretStore for FsSecretStore {
    fn get(&self, user: &str, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(user, key);
        if !path.exists() {
            return Ok(None);
        }
        io::read_file(&path, "read secret").map(|v| Some(v.trim_end().to_string()))
    }

    fn put(&self, user: &str, key: &str, value: &str) -> Result<()> {
        let dir = self.root.join(user);
        io::ensure_dir(&dir, "create secret dir")?;
        io::write_file_atomic(&self.entry_path(user, key), value, "write secret")
    }

    fn delete(&self, user: &str, key: &str) -> Result<()> {
        let path = self.entry_path(user, key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::internal_io(e.to_string(), Some("delete secret".to_string()))),
        }
    }
}

// ============================================================================
// System keychain backend
// ============================================================================

const SERVICE_NAME: &str = "airlift";

fn keyring_error(e: keyring::Error) -> Error {
    Error::internal_unexpected(format!("Keychain error: {}", e))
}

/// Secret storage in the system keychain. Entry name: `<user>:<key>`.
pub struct KeychainSecretStore;

impl KeychainSecretStore {
    fn entry(user: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, &format!("{}:{}", user, key)).map_err(keyring_error)
    }
}

impl SecretStore for KeychainSecretStore {
    fn get(&self, user: &str, key: &str) -> Result<Option<String>> {
        match Self::entry(user, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_error(e)),
        }
    }

    fn put(&self, user: &str, key: &str, value: &str) -> Result<()> {
        Self::entry(user, key)?.set_password(value).map_err(keyring_error)
    }

    fn delete(&self, user: &str, key: &str) -> Result<()> {
        match Self::entry(user, key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(keyring_error(e)),
        }
    }
}

// ============================================================================
// In-memory backend (tests, ephemeral sessions)
// ============================================================================

#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, user: &str, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::internal_unexpected("secret store poisoned"))?;
        Ok(entries.get(&(user.to_string(), key.to_string())).cloned())
    }

    fn put(&self, user: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::internal_unexpected("secret store poisoned"))?;
        entries.insert((user.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, user: &str, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::internal_unexpected("secret store poisoned"))?;
        entries.remove(&(user.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_round_trips_per_user_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSecretStore::new(dir.path().to_path_buf());

        store.put("alice", "compute.token", "ct_123").unwrap();
        assert_eq!(
            store.get("alice", "compute.token").unwrap().as_deref(),
            Some("ct_123")
        );
        assert_eq!(store.get("bob", "compute.token").unwrap(), None);

        store.delete("alice", "compute.token").unwrap();
        assert_eq!(store.get("alice", "compute.token").unwrap(), None);
        // Deleting again is a no-op
        store.delete("alice", "compute.token").unwrap();
    }

    #[test]
    fn last_save_wins_and_provenance_copy_is_kept() {
        let store = MemorySecretStore::new();
        save_token(&store, "u", Provider::Edge, "tok_manual", Some("manual")).unwrap();
        save_token(&store, "u", Provider::Edge, "tok_boot", Some("bootstrap")).unwrap();

        assert_eq!(
            load_token(&store, "u", Provider::Edge).unwrap().as_deref(),
            Some("tok_boot")
        );
        assert_eq!(
            store.get("u", "edge.token.manual").unwrap().as_deref(),
            Some("tok_manual")
        );
        assert_eq!(
            store.get("u", "edge.token.bootstrap").unwrap().as_deref(),
            Some("tok_boot")
        );
    }

    #[test]
    fn forget_tokens_clears_active_and_tagged() {
        let store = MemorySecretStore::new();
        save_token(&store, "u", Provider::Compute, "t1", Some("browser")).unwrap();
        forget_tokens(&store, "u", Provider::Compute).unwrap();
        assert_eq!(load_token(&store, "u", Provider::Compute).unwrap(), None);
        assert_eq!(store.get("u", "compute.token.browser").unwrap(), None);
    }
}
