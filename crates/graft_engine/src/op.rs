//! The operator contract and registry.
//!
//! An operator is a named value implementing [`Operator`]. The registry
//! maps case-sensitive names to trait objects; built-ins are registered
//! once into a process-wide table, and [`Registry::with_custom`] overlays
//! per-engine custom operators without touching the globals.
//!
//! Unknown operator names are not errors: the evaluator leaves those
//! leaves as their original source strings, so documents written for a
//! newer graft flow through older ones unchanged.

use crate::context::OpContext;
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::{Path, Value};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// When the scheduler may run an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Merge,
    Param,
    Eval,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Merge => "merge",
            Phase::Param => "param",
            Phase::Eval => "eval",
        }
    }
}

/// What the evaluator does with an operator's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Substitute the operator-call leaf with the value.
    Replace,
    /// Merge the value into the enclosing mapping (or splice into the
    /// enclosing sequence), removing the call site.
    Inject,
}

/// An operator's result.
#[derive(Debug, Clone)]
pub struct Response {
    pub action: Action,
    pub value: Value,
}

impl Response {
    pub fn replace(value: Value) -> Response {
        Response {
            action: Action::Replace,
            value,
        }
    }

    pub fn inject(value: Value) -> Response {
        Response {
            action: Action::Inject,
            value,
        }
    }
}

/// Whether a dependency participates in cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Unconditional,
    /// From an alternation chain with a literal branch: the reference
    /// may never need to resolve, so cycles through it are survivable.
    Conditional,
}

/// A dependency reported for one operator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDependency {
    pub path: Path,
    pub kind: DependencyKind,
}

impl TrackedDependency {
    pub fn unconditional(path: Path) -> Self {
        Self {
            path,
            kind: DependencyKind::Unconditional,
        }
    }

    pub fn conditional(path: Path) -> Self {
        Self {
            path,
            kind: DependencyKind::Conditional,
        }
    }
}

/// The contract every operator satisfies.
pub trait Operator: Send + Sync {
    /// One-time validation hook, called at registration.
    fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// The phase this operator runs in.
    fn phase(&self) -> Phase;

    /// `(min, max)` argument counts; `max = -1` means unlimited.
    /// Violations fail before [`Operator::run`].
    fn arity(&self) -> (usize, i64) {
        (0, -1)
    }

    /// The dependencies of one call. `auto` holds the references the
    /// scheduler collected from the argument expressions (with
    /// conditional tagging already applied); the default accepts them
    /// unchanged. Operators that do not evaluate their arguments
    /// (`defer`, `param`) drop them; operators with implicit inputs
    /// (`static_ips`) add to them.
    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        auto
    }

    /// Executes the call.
    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response>;
}

/// Enforces the declared arity before `run`.
pub fn check_arity(name: &str, op: &dyn Operator, args: &[Expr]) -> Result<()> {
    let (min, max) = op.arity();
    if args.len() < min {
        return Err(Error::validation(format!(
            "{name} operator requires at least {min} argument{}",
            if min == 1 { "" } else { "s" }
        )));
    }
    if max >= 0 && args.len() as i64 > max {
        return Err(Error::validation(format!(
            "{name} operator accepts at most {max} argument{}",
            if max == 1 { "" } else { "s" }
        )));
    }
    Ok(())
}

static GLOBAL_REGISTRY: Lazy<RwLock<FxHashMap<String, Arc<dyn Operator>>>> =
    Lazy::new(|| RwLock::new(crate::ops::builtins()));

/// Registers an operator process-wide. Later registrations under the
/// same name win, matching the overlay semantics of custom operators.
pub fn register_operator(name: impl Into<String>, op: Arc<dyn Operator>) -> Result<()> {
    op.setup()?;
    GLOBAL_REGISTRY
        .write()
        .expect("operator registry lock poisoned")
        .insert(name.into(), op);
    Ok(())
}

/// The name → operator table one engine evaluates with.
#[derive(Clone)]
pub struct Registry {
    operators: FxHashMap<String, Arc<dyn Operator>>,
}

impl Registry {
    /// Built-ins only.
    pub fn standard() -> Registry {
        Registry {
            operators: GLOBAL_REGISTRY
                .read()
                .expect("operator registry lock poisoned")
                .clone(),
        }
    }

    /// Built-ins overlaid with an engine's custom operators.
    pub fn with_custom(custom: &FxHashMap<String, Arc<dyn Operator>>) -> Registry {
        let mut registry = Registry::standard();
        for (name, op) in custom {
            registry.operators.insert(name.clone(), Arc::clone(op));
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operator>> {
        self.operators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(|s| s.as_str())
    }

    /// Parser options matching this registry's operator names.
    pub fn parse_options(&self, force_enhanced: bool) -> graft_lang::ParseOptions {
        graft_lang::ParseOptions {
            file: None,
            force_enhanced,
            operator_names: self.operators.keys().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_builtins() {
        let registry = Registry::standard();
        for name in [
            "grab", "concat", "vault", "vault-try", "param", "defer", "calc", "static_ips",
            "join", "keys", "sort", "base64", "base64-decode", "file", "load", "empty", "null",
            "ips", "cartesian-product", "prune", "inject", "awsparam", "awssecret",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn registry_is_case_sensitive() {
        let registry = Registry::standard();
        assert!(registry.contains("grab"));
        assert!(!registry.contains("Grab"));
    }

    #[test]
    fn arity_violations_are_validation_errors() {
        let registry = Registry::standard();
        let op = registry.get("concat").unwrap();
        let err = check_arity("concat", op.as_ref(), &[]).unwrap_err();
        assert_eq!(err.kind, graft_base::ErrorKind::Validation);
    }
}
