//! Vault HTTP adapter.
//!
//! Implements [`SecretStore`] against the Vault KV engines. The KV
//! protocol version of each mount is discovered once per client via
//! `sys/internal/ui/mounts` and cached; v2 mounts get the `data/` path
//! segment and the doubly-nested response body unwrapped. Discovery
//! failures fall back to KV v1, which keeps old Vault servers working
//! without the introspection endpoint.
//!
//! # Token Sourcing
//!
//! [`VaultConfig::from_env`] resolves the token in order from
//! `$VAULT_TOKEN`, `~/.vault-token` (raw token file), and `~/.svtoken`
//! (JSON with a `token` field); the address comes from `$VAULT_ADDR`.

use crate::secrets::SecretStore;
use graft_base::{CancelToken, Error, ExternalSource, Result};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::sync::RwLock;
use std::time::Duration;

/// How a KV mount speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KvVersion {
    V1,
    V2,
}

/// Connection settings for [`VaultClient`].
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Endpoint, e.g. `https://vault.example.com:8200`.
    pub addr: String,
    pub token: String,
    /// Carried for embedders that wire a custom TLS agent; the default
    /// agent always verifies certificates.
    pub skip_tls: bool,
}

impl VaultConfig {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            skip_tls: false,
        }
    }

    /// Builds a config from the conventional environment: `$VAULT_ADDR`
    /// plus the token chain `$VAULT_TOKEN`, `~/.vault-token`, `~/.svtoken`.
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var("VAULT_ADDR").unwrap_or_default(),
            token: source_token().unwrap_or_default(),
            skip_tls: false,
        }
    }
}

fn source_token() -> Option<String> {
    if let Ok(token) = std::env::var("VAULT_TOKEN") {
        if !token.is_empty() {
            return Some(token);
        }
    }
    let home = dirs::home_dir()?;
    if let Ok(raw) = std::fs::read_to_string(home.join(".vault-token")) {
        let token = raw.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    // ~/.svtoken is JSON: {"vault": "...", "token": "..."}
    if let Ok(raw) = std::fs::read_to_string(home.join(".svtoken")) {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
            if let Some(token) = json.get("token").and_then(|t| t.as_str()) {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

/// A [`SecretStore`] over the Vault HTTP API.
pub struct VaultClient {
    config: VaultConfig,
    agent: ureq::Agent,
    mount_versions: RwLock<FxHashMap<String, KvVersion>>,
    discovered: RwLock<bool>,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Self {
        if config.skip_tls {
            warn!("vault: skip_tls is set; supply a custom agent via with_agent to disable verification");
        }
        Self {
            config,
            agent: ureq::AgentBuilder::new().build(),
            mount_versions: RwLock::new(FxHashMap::default()),
            discovered: RwLock::new(false),
        }
    }

    /// Uses a caller-built agent (custom TLS, proxies).
    pub fn with_agent(config: VaultConfig, agent: ureq::Agent) -> Self {
        Self {
            config,
            agent,
            mount_versions: RwLock::new(FxHashMap::default()),
            discovered: RwLock::new(false),
        }
    }

    fn vault_error(message: impl Into<String>) -> Error {
        Error::external(ExternalSource::Vault, message)
    }

    fn request(&self, url: &str, cancel: &CancelToken) -> ureq::Request {
        let mut req = self
            .agent
            .get(url)
            .set("X-Vault-Token", &self.config.token);
        if let Some(remaining) = cancel.remaining() {
            req = req.timeout(remaining);
        } else {
            req = req.timeout(Duration::from_secs(30));
        }
        req
    }

    /// Queries `sys/internal/ui/mounts` once and caches each KV mount's
    /// protocol version. Any failure leaves the cache empty; lookups then
    /// assume v1.
    fn discover_mounts(&self, cancel: &CancelToken) {
        {
            let done = self.discovered.read().expect("mount lock poisoned");
            if *done {
                return;
            }
        }
        let mut done = self.discovered.write().expect("mount lock poisoned");
        if *done {
            return;
        }
        *done = true;

        let url = format!("{}/v1/sys/internal/ui/mounts", self.config.addr);
        let response = match self.request(&url, cancel).call() {
            Ok(r) => r,
            Err(e) => {
                debug!("vault: mount discovery failed, assuming KV v1: {e}");
                return;
            }
        };
        let body: serde_json::Value = match response.into_json() {
            Ok(b) => b,
            Err(e) => {
                debug!("vault: mount discovery returned malformed JSON: {e}");
                return;
            }
        };

        let Some(secret_mounts) = body
            .get("data")
            .and_then(|d| d.get("secret"))
            .and_then(|s| s.as_object())
        else {
            return;
        };

        let mut versions = self.mount_versions.write().expect("mount lock poisoned");
        for (mount, info) in secret_mounts {
            let version = info
                .get("options")
                .and_then(|o| o.get("version"))
                .and_then(|v| v.as_str())
                .unwrap_or("1");
            let name = mount.trim_end_matches('/').to_string();
            let kv = if version == "2" { KvVersion::V2 } else { KvVersion::V1 };
            debug!("vault: mount '{name}' speaks KV {kv:?}");
            versions.insert(name, kv);
        }
    }

    fn mount_version(&self, mount: &str, cancel: &CancelToken) -> KvVersion {
        self.discover_mounts(cancel);
        self.mount_versions
            .read()
            .expect("mount lock poisoned")
            .get(mount)
            .copied()
            .unwrap_or(KvVersion::V1)
    }
}

impl SecretStore for VaultClient {
    fn lookup(
        &self,
        mount: &str,
        path: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>> {
        cancel.check()?;
        if self.config.addr.is_empty() {
            return Err(Self::vault_error("VAULT_ADDR is not set"));
        }
        if self.config.token.is_empty() {
            return Err(Self::vault_error("no vault token available"));
        }

        let version = self.mount_version(mount, cancel);
        let url = match version {
            KvVersion::V1 => format!("{}/v1/{}/{}", self.config.addr, mount, path),
            KvVersion::V2 => format!("{}/v1/{}/data/{}", self.config.addr, mount, path),
        };
        debug!("vault: GET {url}");

        cancel.check()?;
        let response = match self.request(&url, cancel).call() {
            Ok(r) => r,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(ureq::Error::Status(403, _)) => {
                return Err(Self::vault_error(format!(
                    "permission denied reading {mount}/{path}"
                )))
            }
            Err(ureq::Error::Status(code, r)) => {
                let message = r.into_string().unwrap_or_default();
                return Err(Self::vault_error(format!(
                    "vault returned {code} for {mount}/{path}: {message}"
                )));
            }
            Err(e) => return Err(Self::vault_error(e.to_string())),
        };

        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| Self::vault_error(format!("malformed vault response: {e}")))?;

        let data = match version {
            KvVersion::V1 => body.get("data"),
            KvVersion::V2 => body.get("data").and_then(|d| d.get("data")),
        };
        let Some(found) = data.and_then(|d| d.get(key)) else {
            return Ok(None);
        };

        Ok(Some(match found {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }
}
