//! The secret-store seam between the engine and Vault.
//!
//! Operators address secrets as `mount/path:key`. The engine splits that
//! reference and asks a [`SecretStore`] for the key; `Ok(None)` means the
//! path exists but lacks the key, or the path is absent entirely —
//! operators turn that into a reference failure that alternation can
//! recover from.

use graft_base::{CancelToken, Result};
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// Lookup capability required by the `vault` operator family.
pub trait SecretStore: Send + Sync {
    /// Fetches `key` from the secret at `mount`/`path`.
    ///
    /// `Ok(None)` when the secret or key does not exist; `Err` for
    /// transport and authentication failures.
    fn lookup(
        &self,
        mount: &str,
        path: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>>;
}

/// An in-memory store for tests and offline evaluation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<FxHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a secret under its full `mount/path:key` reference.
    pub fn insert(&self, reference: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .expect("memory store lock poisoned")
            .insert(reference.into(), value.into());
    }
}

impl SecretStore for MemoryStore {
    fn lookup(
        &self,
        mount: &str,
        path: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>> {
        cancel.check()?;
        let reference = format!("{mount}/{path}:{key}");
        Ok(self
            .entries
            .read()
            .expect("memory store lock poisoned")
            .get(&reference)
            .cloned())
    }
}

/// Splits a `mount/path:key` reference into its three parts.
///
/// The mount is the first path component; the key follows the last `:`.
pub fn split_reference(reference: &str) -> Option<(&str, &str, &str)> {
    let (path_part, key) = reference.rsplit_once(':')?;
    if key.is_empty() {
        return None;
    }
    let (mount, path) = path_part.split_once('/')?;
    if mount.is_empty() || path.is_empty() {
        return None;
    }
    Some((mount, path, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_reference_three_parts() {
        assert_eq!(
            split_reference("secret/hand:shake"),
            Some(("secret", "hand", "shake"))
        );
        assert_eq!(
            split_reference("secret/a/deep/path:key"),
            Some(("secret", "a/deep/path", "key"))
        );
    }

    #[test]
    fn split_reference_rejects_malformed() {
        assert_eq!(split_reference("no-key"), None);
        assert_eq!(split_reference("nokey:"), None);
        assert_eq!(split_reference("nopath:key"), None);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.insert("secret/hand:shake", "classified");
        let cancel = CancelToken::new();
        assert_eq!(
            store.lookup("secret", "hand", "shake", &cancel).unwrap(),
            Some("classified".to_string())
        );
        assert_eq!(store.lookup("secret", "hand", "other", &cancel).unwrap(), None);
    }

    #[test]
    fn memory_store_observes_cancellation() {
        let store = MemoryStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(store.lookup("secret", "a", "b", &cancel).is_err());
    }
}
