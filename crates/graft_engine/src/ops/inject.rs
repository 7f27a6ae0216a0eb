//! `(( inject target ))` — merge a subtree into the enclosing mapping.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Resolves its target and asks the evaluator to merge it into the
/// call's parent. Keys defined locally in the parent win over injected
/// ones. Runs in the Merge phase, before references evaluate.
pub struct Inject;

impl Operator for Inject {
    fn phase(&self) -> Phase {
        Phase::Merge
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let value = match &args[0] {
            // Inject may target subtrees that still contain unevaluated
            // operators (they evaluate after injection), so bypass the
            // unevaluated-expression guard used by ordinary references.
            Expr::Reference(path, _) => {
                let canonical = path.canonicalize(ctx.root)?;
                canonical.resolve(ctx.root)?.deep_clone()
            }
            other => ctx.resolve(other)?,
        };
        if !matches!(value, Value::Map(_) | Value::List(_)) {
            return Err(Error::validation(format!(
                "inject requires a map or list target, got {}",
                value.type_name()
            )));
        }
        Ok(Response::inject(value))
    }
}
