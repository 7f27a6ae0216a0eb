//! Shared evaluation state and the per-call operator context.
//!
//! [`EvalState`] is the operator-state interface: the caches and
//! registries built-in operators read and write while a document
//! evaluates. Each cache sits behind its own `RwLock`, so operators
//! running on pool workers contend only on the cache they actually
//! touch. One `EvalState` lives for one evaluation, which is what scopes
//! the lookup memoization.
//!
//! [`OpContext`] is what an operator sees while running: an immutable
//! root snapshot, its own cursor, the state, options, registry, and the
//! cancellation token. Expression resolution ([`OpContext::resolve`])
//! lives here because nested operator calls recurse through it.

use crate::op::{check_arity, Action, Registry};
use crate::options::EngineOptions;
use graft_base::{CancelToken, Error, Result};
use graft_lang::parser::is_opcall;
use graft_lang::{BinaryOp, Expr, UnaryOp};
use graft_system::{ParameterStore, SecretStore, SecretsManager};
use graft_tree::{Path, Value};
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// Caches and registrations shared across one evaluation.
#[derive(Default)]
pub struct EvalState {
    /// Vault lookups, keyed by the full `mount/path:key` reference.
    pub vault_cache: RwLock<FxHashMap<String, String>>,
    /// Every vault reference consulted, in first-seen order.
    pub vault_refs: RwLock<Vec<String>>,
    pub aws_param_cache: RwLock<FxHashMap<String, String>>,
    pub aws_secret_cache: RwLock<FxHashMap<String, String>>,
    /// Allocated static IPs and the cursor that claimed each.
    pub used_ips: RwLock<FxHashMap<String, Path>>,
    /// Paths registered for post-evaluation removal.
    pub prune_paths: RwLock<Vec<Path>>,
    /// Paths registered for post-evaluation sorting, with optional field.
    pub sort_paths: RwLock<Vec<(Path, Option<String>)>>,

    pub secret_store: Option<Arc<dyn SecretStore>>,
    pub parameter_store: Option<Arc<dyn ParameterStore>>,
    pub secrets_manager: Option<Arc<dyn SecretsManager>>,
}

impl EvalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_prune(&self, path: Path) {
        let mut paths = self.prune_paths.write().expect("prune lock poisoned");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    pub fn register_sort(&self, path: Path, field: Option<String>) {
        let mut paths = self.sort_paths.write().expect("sort lock poisoned");
        if !paths.iter().any(|(p, _)| *p == path) {
            paths.push((path, field));
        }
    }

    /// Claims a static IP for `owner`. Claiming the same IP twice from
    /// the same cursor is idempotent; from different cursors it is a
    /// duplicate-allocation error.
    pub fn claim_static_ip(&self, ip: &str, owner: &Path) -> Result<()> {
        let mut used = self.used_ips.write().expect("used-ip lock poisoned");
        if let Some(existing) = used.get(ip) {
            if existing != owner {
                return Err(Error::validation(format!(
                    "static IP {ip} is already allocated at {existing}"
                )));
            }
            return Ok(());
        }
        used.insert(ip.to_string(), owner.clone());
        Ok(())
    }

    pub fn track_vault_ref(&self, reference: &str) {
        let mut refs = self.vault_refs.write().expect("vault refs lock poisoned");
        if !refs.iter().any(|r| r == reference) {
            refs.push(reference.to_string());
        }
    }
}

fn cache_get(cache: &RwLock<FxHashMap<String, String>>, key: &str) -> Option<String> {
    cache.read().expect("cache lock poisoned").get(key).cloned()
}

fn cache_put(
    cache: &RwLock<FxHashMap<String, String>>,
    options: &EngineOptions,
    key: &str,
    value: &str,
) {
    if !options.enable_caching {
        return;
    }
    let mut cache = cache.write().expect("cache lock poisoned");
    if options.cache_size > 0 && cache.len() >= options.cache_size && !cache.contains_key(key) {
        return;
    }
    cache.insert(key.to_string(), value.to_string());
}

/// Everything an operator can see while running one call.
pub struct OpContext<'a> {
    /// Immutable snapshot of the document root.
    pub root: &'a Value,
    /// Canonical cursor of the operator call being evaluated.
    pub here: &'a Path,
    pub state: &'a EvalState,
    pub options: &'a EngineOptions,
    pub registry: &'a Registry,
    pub cancel: &'a CancelToken,
}

impl<'a> OpContext<'a> {
    /// Resolves an expression to a concrete value.
    ///
    /// Alternation tries each branch in order and yields the first that
    /// resolves; cancellation is never swallowed by a fallback.
    pub fn resolve(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value, _) => Ok(value.clone()),
            Expr::Reference(path, _) => self.resolve_path(path),
            Expr::EnvVar(name, _) => match std::env::var(name) {
                Ok(value) => Ok(Value::String(value)),
                Err(_) => Err(Error::reference(format!(
                    "environment variable ${name} is not set"
                ))),
            },
            Expr::Alternation { branches, .. } => {
                let mut last = None;
                for branch in branches {
                    match self.resolve(branch) {
                        Ok(value) => return Ok(value),
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| {
                    Error::evaluation("alternation with no branches")
                }))
            }
            Expr::Call { name, args, pos } => self.run_nested(name, args, pos),
            Expr::Unary { .. } | Expr::Binary { .. } | Expr::Ternary { .. } => {
                eval_arithmetic(self, expr)
            }
        }
    }

    /// Resolves a tree reference, refusing values that still contain
    /// unevaluated operator expressions.
    pub fn resolve_path(&self, path: &Path) -> Result<Value> {
        let canonical = path.canonicalize(self.root)?;
        let value = canonical.resolve(self.root)?;
        if subtree_has_opcall(value) {
            return Err(Error::reference(format!(
                "`{path}` refers to an unevaluated operator expression (possibly a dependency cycle)"
            )));
        }
        Ok(value.clone())
    }

    /// Resolves an expression and stringifies the result.
    pub fn resolve_string(&self, expr: &Expr) -> Result<String> {
        let value = self.resolve(expr)?;
        value.stringify().ok_or_else(|| {
            Error::validation(format!(
                "argument resolved to a {}, expected a scalar",
                value.type_name()
            ))
        })
    }

    fn run_nested(&self, name: &str, args: &[Expr], pos: &graft_base::Pos) -> Result<Value> {
        let op = self.registry.get(name).ok_or_else(|| {
            Error::operator(format!("no such operator '{name}'")).with_pos(pos.clone())
        })?;
        check_arity(name, op.as_ref(), args)?;
        let response = op.run(self, args)?;
        match response.action {
            Action::Replace => Ok(response.value),
            Action::Inject => Err(Error::operator(format!(
                "'{name}' cannot be used as a nested expression"
            ))),
        }
    }

    // ---- operator-state interface -------------------------------------

    pub fn vault_cached(&self, reference: &str) -> Option<String> {
        if !self.options.enable_caching {
            return None;
        }
        cache_get(&self.state.vault_cache, reference)
    }

    pub fn vault_remember(&self, reference: &str, value: &str) {
        cache_put(&self.state.vault_cache, self.options, reference, value);
    }

    pub fn aws_param_cached(&self, name: &str) -> Option<String> {
        if !self.options.enable_caching {
            return None;
        }
        cache_get(&self.state.aws_param_cache, name)
    }

    pub fn aws_param_remember(&self, name: &str, value: &str) {
        cache_put(&self.state.aws_param_cache, self.options, name, value);
    }

    pub fn aws_secret_cached(&self, name: &str) -> Option<String> {
        if !self.options.enable_caching {
            return None;
        }
        cache_get(&self.state.aws_secret_cache, name)
    }

    pub fn aws_secret_remember(&self, name: &str, value: &str) {
        cache_put(&self.state.aws_secret_cache, self.options, name, value);
    }
}

/// True if any string leaf of the subtree is an operator expression.
pub fn subtree_has_opcall(value: &Value) -> bool {
    match value {
        Value::String(s) => is_opcall(s),
        Value::List(items) => items.iter().any(subtree_has_opcall),
        Value::Map(entries) => entries.values().any(subtree_has_opcall),
        _ => false,
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_number(value: &Value) -> Option<Num> {
    match value {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

/// Evaluates arithmetic, comparison, boolean, and ternary expressions.
///
/// Numeric rules: integer arithmetic stays integral, any float operand
/// widens to IEEE-754 double, and integer division that is not exact
/// widens to float.
pub fn eval_arithmetic(ctx: &OpContext<'_>, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Unary { op, operand, .. } => {
            let value = eval_arithmetic(ctx, operand)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match as_number(&value) {
                    Some(Num::Int(n)) => Ok(Value::Int(-n)),
                    Some(Num::Float(x)) => Ok(Value::Float(-x)),
                    None => Err(Error::validation(format!(
                        "cannot negate a {}",
                        value.type_name()
                    ))),
                },
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => eval_binary(ctx, *op, lhs, rhs),
        Expr::Ternary {
            cond,
            then,
            otherwise,
            ..
        } => {
            if eval_arithmetic(ctx, cond)?.is_truthy() {
                eval_arithmetic(ctx, then)
            } else {
                eval_arithmetic(ctx, otherwise)
            }
        }
        other => ctx.resolve(other),
    }
}

fn eval_binary(ctx: &OpContext<'_>, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
    // Boolean operators short-circuit and return the deciding operand.
    match op {
        BinaryOp::Or => {
            let left = eval_arithmetic(ctx, lhs)?;
            if left.is_truthy() {
                return Ok(left);
            }
            return eval_arithmetic(ctx, rhs);
        }
        BinaryOp::And => {
            let left = eval_arithmetic(ctx, lhs)?;
            if !left.is_truthy() {
                return Ok(left);
            }
            return eval_arithmetic(ctx, rhs);
        }
        _ => {}
    }

    let left = eval_arithmetic(ctx, lhs)?;
    let right = eval_arithmetic(ctx, rhs)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, &left, &right),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            numeric(op, &left, &right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => num_as_f64(&l) == num_as_f64(&r),
        _ => left == right,
    }
}

fn num_as_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(x) => *x,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let ordering = match (left, right) {
        (Value::String(l), Value::String(r)) => l.partial_cmp(r),
        _ => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => num_as_f64(&l).partial_cmp(&num_as_f64(&r)),
            _ => {
                return Err(Error::validation(format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let (Some(l), Some(r)) = (as_number(left), as_number(right)) else {
        return Err(Error::validation(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };

    if let (Num::Int(a), Num::Int(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        return match op {
            BinaryOp::Add => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| Error::evaluation("integer overflow")),
            BinaryOp::Sub => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| Error::evaluation("integer overflow")),
            BinaryOp::Mul => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| Error::evaluation("integer overflow")),
            BinaryOp::Div => {
                if b == 0 {
                    Err(Error::evaluation("division by zero"))
                } else if a % b == 0 {
                    Ok(Value::Int(a / b))
                } else {
                    Ok(Value::Float(a as f64 / b as f64))
                }
            }
            BinaryOp::Mod => {
                if b == 0 {
                    Err(Error::evaluation("modulo by zero"))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => unreachable!(),
        };
    }

    let (a, b) = (num_as_f64(&l), num_as_f64(&r));
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_opcall_detection() {
        assert!(subtree_has_opcall(&Value::from("(( grab a ))")));
        assert!(!subtree_has_opcall(&Value::from("plain")));
        let nested = Value::list(vec![Value::from("x"), Value::from("(( grab a ))")]);
        assert!(subtree_has_opcall(&nested));
    }

    #[test]
    fn claim_static_ip_is_idempotent_per_owner() {
        let state = EvalState::new();
        let owner = Path::parse("jobs.api").unwrap();
        state.claim_static_ip("10.0.0.5", &owner).unwrap();
        state.claim_static_ip("10.0.0.5", &owner).unwrap();

        let thief = Path::parse("jobs.db").unwrap();
        let err = state.claim_static_ip("10.0.0.5", &thief).unwrap_err();
        assert!(err.to_string().contains("already allocated"));
    }

    #[test]
    fn register_sort_dedupes_by_path() {
        let state = EvalState::new();
        let path = Path::parse("xs").unwrap();
        state.register_sort(path.clone(), None);
        state.register_sort(path, Some("name".into()));
        assert_eq!(state.sort_paths.read().unwrap().len(), 1);
    }
}
