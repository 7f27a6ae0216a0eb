//! Built-in operators.
//!
//! One module per operator family; [`builtins`] assembles the standard
//! registry table. Every operator here follows the same shape: a unit
//! struct, a declared phase and arity, and a `run` that resolves its
//! arguments through the [`OpContext`](crate::context::OpContext).

pub mod aws;
pub mod base64;
pub mod calc;
pub mod cartesian;
pub mod concat;
pub mod defer;
pub mod empty;
pub mod file;
pub mod grab;
pub mod inject;
pub mod ips;
pub mod join;
pub mod keys;
pub mod param;
pub mod prune;
pub mod sort;
pub mod static_ips;
pub mod vault;

use crate::context::OpContext;
use crate::op::Operator;
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The token emitted instead of secrets when a store is skipped.
pub const REDACTED: &str = "REDACTED";

/// Resolves a store-backed operator's argument with fallback semantics.
///
/// Without alternation, the argument names the external reference and
/// `fetch` is consulted. With alternation, the first branch (and any
/// nested-call branch) is a lookup; a later literal or reference branch
/// is a default returned without consulting the store. Cancellation is
/// never swallowed by a fallback.
pub(crate) fn lookup_or_default(
    ctx: &OpContext<'_>,
    arg: &Expr,
    fetch: &dyn Fn(&str) -> Result<String>,
) -> Result<Value> {
    let Expr::Alternation { branches, .. } = arg else {
        let reference = ctx.resolve_string(arg)?;
        return fetch(&reference).map(Value::String);
    };

    let mut last: Option<Error> = None;
    for (i, branch) in branches.iter().enumerate() {
        let attempt = match branch {
            // A nested call (e.g. another vault lookup) resolves itself.
            Expr::Call { .. } => ctx.resolve(branch),
            _ if i == 0 => ctx
                .resolve_string(branch)
                .and_then(|reference| fetch(&reference).map(Value::String)),
            // A later plain branch is the default value.
            _ => return ctx.resolve(branch),
        };
        match attempt {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => last = Some(e),
        }
    }
    Err(last.unwrap_or_else(|| Error::evaluation("alternation with no branches")))
}

/// The standard operator table.
pub fn builtins() -> FxHashMap<String, Arc<dyn Operator>> {
    let mut map: FxHashMap<String, Arc<dyn Operator>> = FxHashMap::default();
    let mut put = |name: &str, op: Arc<dyn Operator>| {
        map.insert(name.to_string(), op);
    };

    put("grab", Arc::new(grab::Grab));
    put("concat", Arc::new(concat::Concat));
    put("join", Arc::new(join::Join));
    put("keys", Arc::new(keys::Keys));
    put("vault", Arc::new(vault::Vault));
    put("vault-try", Arc::new(vault::VaultTry));
    put("param", Arc::new(param::Param));
    put("defer", Arc::new(defer::Defer));
    put("calc", Arc::new(calc::Calc));
    put("static_ips", Arc::new(static_ips::StaticIps));
    put("ips", Arc::new(ips::Ips));
    put("sort", Arc::new(sort::Sort));
    put("base64", Arc::new(base64::Base64Encode));
    put("base64-decode", Arc::new(base64::Base64Decode));
    put("file", Arc::new(file::File));
    put("load", Arc::new(file::Load));
    put("empty", Arc::new(empty::Empty));
    put("null", Arc::new(empty::Null));
    put("cartesian-product", Arc::new(cartesian::CartesianProduct));
    put("prune", Arc::new(prune::Prune));
    put("inject", Arc::new(inject::Inject));
    put("awsparam", Arc::new(aws::AwsParam));
    put("awssecret", Arc::new(aws::AwsSecret));

    map
}
