//! Engine configuration.
//!
//! All knobs live in one explicit [`EngineOptions`] value passed to the
//! engine; nothing is read from ambient globals. Environment fallbacks
//! are applied only by [`EngineOptions::from_env`], so tests and
//! embedders stay deterministic by default.

use crate::op::Operator;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Tie-break order used by the dependency scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataflowOrder {
    /// Ready jobs run in path order. The default; output and operator
    /// call sequence are bit-stable across runs.
    #[default]
    Alphabetical,
    /// Ready jobs run in document scan order (depth-first, mappings in
    /// insertion order).
    Insertion,
}

/// Explicit engine configuration.
#[derive(Clone, Default)]
pub struct EngineOptions {
    pub vault_addr: Option<String>,
    pub vault_token: Option<String>,
    pub vault_skip_tls: bool,
    /// Bypass vault lookups and emit `REDACTED`.
    pub skip_vault: bool,
    pub aws_region: Option<String>,
    pub aws_profile: Option<String>,
    /// Bypass AWS lookups and emit `REDACTED`.
    pub skip_aws: bool,
    /// Skip the parser heuristic and always use the enhanced parser.
    pub use_enhanced_parser: bool,
    /// Memoize external lookups for the lifetime of the evaluation.
    pub enable_caching: bool,
    /// Upper bound on memoized entries per cache (0 = unbounded).
    pub cache_size: usize,
    /// Worker threads for ready jobs; `<= 1` keeps the lock-free
    /// single-worker path.
    pub max_concurrency: usize,
    pub dataflow_order: DataflowOrder,
    /// Extra operators overlaying the built-in registry.
    pub custom_operators: FxHashMap<String, Arc<dyn Operator>>,
}

impl EngineOptions {
    pub fn new() -> Self {
        Self {
            enable_caching: true,
            ..Self::default()
        }
    }

    /// Fills vault/AWS settings from the conventional environment
    /// variables (`VAULT_ADDR`, `VAULT_TOKEN`, `AWS_REGION`,
    /// `AWS_PROFILE`) where not already set.
    pub fn from_env() -> Self {
        let mut opts = Self::new();
        opts.vault_addr = std::env::var("VAULT_ADDR").ok().filter(|v| !v.is_empty());
        opts.vault_token = std::env::var("VAULT_TOKEN").ok().filter(|v| !v.is_empty());
        opts.aws_region = std::env::var("AWS_REGION").ok().filter(|v| !v.is_empty());
        opts.aws_profile = std::env::var("AWS_PROFILE").ok().filter(|v| !v.is_empty());
        opts
    }

    pub fn with_skip_vault(mut self, skip: bool) -> Self {
        self.skip_vault = skip;
        self
    }

    pub fn with_skip_aws(mut self, skip: bool) -> Self {
        self.skip_aws = skip;
        self
    }

    pub fn with_dataflow_order(mut self, order: DataflowOrder) -> Self {
        self.dataflow_order = order;
        self
    }

    pub fn with_max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    pub fn with_operator(mut self, name: impl Into<String>, op: Arc<dyn Operator>) -> Self {
        self.custom_operators.insert(name.into(), op);
        self
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &self.vault_token.as_ref().map(|_| "<redacted>"))
            .field("skip_vault", &self.skip_vault)
            .field("aws_region", &self.aws_region)
            .field("aws_profile", &self.aws_profile)
            .field("skip_aws", &self.skip_aws)
            .field("use_enhanced_parser", &self.use_enhanced_parser)
            .field("enable_caching", &self.enable_caching)
            .field("cache_size", &self.cache_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("dataflow_order", &self.dataflow_order)
            .field(
                "custom_operators",
                &self.custom_operators.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
