//! # graft-system
//!
//! Platform IO and external service adapters for graft.
//!
//! - [`secrets`] — the [`SecretStore`](secrets::SecretStore) trait and the
//!   in-memory double used by tests
//! - [`vault`] — the Vault HTTP implementation (KV v1/v2, mount
//!   discovery, token sourcing)
//! - [`aws`] — Parameter Store / Secrets Manager adapter traits
//! - [`fs`] — file reading with typed error mapping
//!
//! Everything here is a collaborator of the engine, reached through
//! traits so evaluations can run fully offline (skip modes, memory
//! doubles) or against real services.

pub mod aws;
pub mod fs;
pub mod secrets;
pub mod vault;

pub use aws::{AwsConfig, MemoryParameterStore, MemorySecretsManager, ParameterStore, SecretsManager};
pub use secrets::{MemoryStore, SecretStore};
pub use vault::{VaultClient, VaultConfig};
