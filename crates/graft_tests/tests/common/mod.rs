//! E2E Test Harness
//!
//! Helpers for merging and evaluating YAML document streams through the
//! full engine pipeline, plus a counting secret store for cache tests.

#![allow(dead_code)]

use graft_base::{CancelToken, MultiError, Result};
use graft_engine::{Engine, EngineOptions, MergeOptions};
use graft_system::{MemoryStore, SecretStore};
use graft_tree::{Path, Tree, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Merges and evaluates a document stream with default options.
pub fn evaluate(sources: &[&str]) -> Tree {
    evaluate_with(sources, &MergeOptions::new(), EngineOptions::new())
}

/// Merges and evaluates with explicit options.
pub fn evaluate_with(sources: &[&str], merge: &MergeOptions, options: EngineOptions) -> Tree {
    Engine::new(options)
        .merge_and_evaluate(sources, merge)
        .unwrap_or_else(|e| panic!("evaluation failed:\n{e}"))
}

/// Merges and evaluates, expecting failure.
pub fn evaluate_err(sources: &[&str]) -> MultiError {
    evaluate_err_with(sources, &MergeOptions::new(), EngineOptions::new())
}

pub fn evaluate_err_with(
    sources: &[&str],
    merge: &MergeOptions,
    options: EngineOptions,
) -> MultiError {
    match Engine::new(options).merge_and_evaluate(sources, merge) {
        Ok(tree) => panic!(
            "expected failure, got:\n{}",
            graft_engine::doc::to_yaml_string(&tree).unwrap()
        ),
        Err(errors) => errors,
    }
}

pub fn get(tree: &Tree, path: &str) -> Value {
    tree.get(&Path::parse(path).unwrap())
        .unwrap_or_else(|e| panic!("missing {path}: {e}"))
        .clone()
}

pub fn get_str(tree: &Tree, path: &str) -> String {
    match get(tree, path) {
        Value::String(s) => s,
        other => panic!("{path} is a {}, expected string", other.type_name()),
    }
}

pub fn get_int(tree: &Tree, path: &str) -> i64 {
    get(tree, path)
        .as_int()
        .unwrap_or_else(|| panic!("{path} is not an integer"))
}

pub fn exists(tree: &Tree, path: &str) -> bool {
    tree.exists(&Path::parse(path).unwrap())
}

pub fn to_yaml(tree: &Tree) -> String {
    graft_engine::doc::to_yaml_string(tree).unwrap()
}

/// A secret store that counts lookups, for cache assertions.
pub struct CountingStore {
    inner: MemoryStore,
    lookups: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, reference: &str, value: &str) {
        self.inner.insert(reference, value);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SecretStore for CountingStore {
    fn lookup(
        &self,
        mount: &str,
        path: &str,
        key: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(mount, path, key, cancel)
    }
}

/// An engine wired with a seeded memory secret store.
pub fn engine_with_secrets(entries: &[(&str, &str)]) -> Engine {
    let store = MemoryStore::new();
    for (reference, value) in entries {
        store.insert(*reference, *value);
    }
    Engine::new(EngineOptions::new()).with_secret_store(Arc::new(store))
}
