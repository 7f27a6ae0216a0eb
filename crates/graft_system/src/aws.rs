//! AWS adapter traits: Parameter Store and Secrets Manager.
//!
//! The engine only needs `name → string` lookups; the concrete SDK
//! clients (signing, regions, credential chains) are wired by the
//! embedding application. The memory doubles here back tests and
//! offline evaluation.

use graft_base::{CancelToken, Result};
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// Region/profile selection passed through to whichever SDK client the
/// embedder constructs.
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl AwsConfig {
    /// Reads `$AWS_REGION` and `$AWS_PROFILE`.
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()),
            profile: std::env::var("AWS_PROFILE").ok().filter(|p| !p.is_empty()),
        }
    }
}

/// SSM Parameter Store lookups for the `awsparam` operator.
pub trait ParameterStore: Send + Sync {
    /// `Ok(None)` when the parameter does not exist.
    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<Option<String>>;
}

/// Secrets Manager lookups for the `awssecret` operator.
pub trait SecretsManager: Send + Sync {
    /// `Ok(None)` when the secret does not exist.
    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<Option<String>>;
}

/// In-memory [`ParameterStore`] double.
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    entries: RwLock<FxHashMap<String, String>>,
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .expect("parameter store lock poisoned")
            .insert(name.into(), value.into());
    }
}

impl ParameterStore for MemoryParameterStore {
    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<Option<String>> {
        cancel.check()?;
        Ok(self
            .entries
            .read()
            .expect("parameter store lock poisoned")
            .get(name)
            .cloned())
    }
}

/// In-memory [`SecretsManager`] double.
#[derive(Debug, Default)]
pub struct MemorySecretsManager {
    entries: RwLock<FxHashMap<String, String>>,
}

impl MemorySecretsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .expect("secrets manager lock poisoned")
            .insert(name.into(), value.into());
    }
}

impl SecretsManager for MemorySecretsManager {
    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<Option<String>> {
        cancel.check()?;
        Ok(self
            .entries
            .read()
            .expect("secrets manager lock poisoned")
            .get(name)
            .cloned())
    }
}
