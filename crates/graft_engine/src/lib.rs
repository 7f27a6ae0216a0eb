//! # graft-engine
//!
//! The merge–evaluate pipeline for graft documents.
//!
//! ```text
//! YAML/JSON sources
//!     │  doc::parse_documents
//!     ▼
//! ┌─────────────┐   fold + strategies + sentinels
//! │ Merge engine│──────────────────────────────────┐
//! └─────────────┘                                  ▼
//! ┌─────────────┐   per phase: collect → schedule → run
//! │  Evaluator  │   (Merge, Param, Eval) + sort/prune passes
//! └─────────────┘
//!     │  doc::to_yaml_string / to_json_string
//!     ▼
//! evaluated document
//! ```
//!
//! The [`Engine`] façade ties the pieces together:
//!
//! ```
//! use graft_engine::{Engine, EngineOptions, MergeOptions};
//!
//! let engine = Engine::new(EngineOptions::new());
//! let tree = engine
//!     .merge_and_evaluate(
//!         &[
//!             "meta: { app: myapp, v: \"1.0\" }\nname: (( concat meta.app \"-\" meta.v ))\n",
//!         ],
//!         &MergeOptions::new(),
//!     )
//!     .unwrap();
//! let yaml = graft_engine::doc::to_yaml_string(&tree).unwrap();
//! assert!(yaml.contains("name: myapp-1.0"));
//! ```

pub mod context;
pub mod doc;
pub mod eval;
pub mod graph;
pub mod merge;
pub mod op;
pub mod options;
pub mod ops;
pub mod pool;

pub use context::{EvalState, OpContext};
pub use eval::Evaluator;
pub use merge::{merge_trees, ArrayStrategy, MergeOptions, MergeOutcome};
pub use op::{
    register_operator, Action, DependencyKind, Operator, Phase, Registry, Response,
    TrackedDependency,
};
pub use options::{DataflowOrder, EngineOptions};

use graft_base::{CancelToken, MultiError};
use graft_system::vault::{VaultClient, VaultConfig};
use graft_system::{ParameterStore, SecretStore, SecretsManager};
use graft_tree::Tree;
use std::sync::Arc;

/// One configured merge–evaluate pipeline.
///
/// An engine is cheap to construct and holds no document state; each
/// [`Engine::merge_and_evaluate`] call evaluates with fresh caches, so
/// external lookups are memoized for exactly one evaluation.
pub struct Engine {
    options: EngineOptions,
    cancel: CancelToken,
    secret_store: Option<Arc<dyn SecretStore>>,
    parameter_store: Option<Arc<dyn ParameterStore>>,
    secrets_manager: Option<Arc<dyn SecretsManager>>,
}

impl Engine {
    /// Builds an engine. A Vault HTTP client is wired automatically when
    /// `vault_addr` is configured and lookups are not skipped; AWS
    /// clients are supplied by the embedder via
    /// [`Engine::with_parameter_store`] / [`Engine::with_secrets_manager`].
    pub fn new(options: EngineOptions) -> Engine {
        let secret_store: Option<Arc<dyn SecretStore>> = match &options.vault_addr {
            Some(addr) if !options.skip_vault => {
                let mut config = VaultConfig::from_env();
                config.addr = addr.clone();
                if let Some(token) = &options.vault_token {
                    config.token = token.clone();
                }
                config.skip_tls = options.vault_skip_tls;
                Some(Arc::new(VaultClient::new(config)))
            }
            _ => None,
        };
        Engine {
            options,
            cancel: CancelToken::new(),
            secret_store,
            parameter_store: None,
            secrets_manager: None,
        }
    }

    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Engine {
        self.secret_store = Some(store);
        self
    }

    pub fn with_parameter_store(mut self, store: Arc<dyn ParameterStore>) -> Engine {
        self.parameter_store = Some(store);
        self
    }

    pub fn with_secrets_manager(mut self, store: Arc<dyn SecretsManager>) -> Engine {
        self.secrets_manager = Some(store);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The token that aborts parsing, merging, and evaluation.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Parses each source (multi-document YAML or JSON) and flattens the
    /// result into one document stream.
    pub fn parse(&self, sources: &[&str]) -> std::result::Result<Vec<Tree>, MultiError> {
        let mut docs = Vec::new();
        for (i, source) in sources.iter().enumerate() {
            self.cancel.check().map_err(MultiError::from)?;
            let name = format!("document {}", i + 1);
            docs.extend(doc::parse_documents(source, Some(&name)).map_err(MultiError::from)?);
        }
        Ok(docs)
    }

    /// Folds a document stream without evaluating operators.
    pub fn merge(
        &self,
        docs: &[Tree],
        opts: &MergeOptions,
    ) -> std::result::Result<MergeOutcome, MultiError> {
        merge::merge_trees(docs, opts, &self.cancel)
    }

    /// Evaluates an already-merged tree in place.
    pub fn evaluate(&self, tree: &mut Tree) -> std::result::Result<(), MultiError> {
        self.evaluator(&MergeOptions::new()).evaluate(tree)
    }

    /// The full pipeline: parse, fold, evaluate, post-process.
    pub fn merge_and_evaluate(
        &self,
        sources: &[&str],
        opts: &MergeOptions,
    ) -> std::result::Result<Tree, MultiError> {
        let docs = self.parse(sources)?;
        let outcome = self.merge(&docs, opts)?;
        let mut tree = outcome.tree;

        let evaluator = self.evaluator(opts);
        for (path, field) in outcome.sort_paths {
            evaluator.state().register_sort(path, field);
        }
        evaluator.evaluate(&mut tree)?;
        Ok(tree)
    }

    fn evaluator(&self, opts: &MergeOptions) -> Evaluator {
        let mut state = EvalState::new();
        state.secret_store = self.secret_store.clone();
        state.parameter_store = self.parameter_store.clone();
        state.secrets_manager = self.secrets_manager.clone();
        Evaluator::with_state(self.options.clone(), state)
            .with_cancel(self.cancel.clone())
            .with_prune_request(opts.prune.clone())
    }
}
