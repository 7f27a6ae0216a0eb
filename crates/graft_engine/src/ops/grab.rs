//! `(( grab path [|| fallback …] ))` — cross-document reference.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::Result;
use graft_lang::Expr;
use graft_tree::Value;

/// Resolves a reference in the evaluated tree; alternation falls back to
/// the first branch that resolves. Multiple arguments yield a list.
pub struct Grab;

impl Operator for Grab {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        if args.len() == 1 {
            return Ok(Response::replace(ctx.resolve(&args[0])?));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(ctx.resolve(arg)?);
        }
        Ok(Response::replace(Value::list(values)))
    }
}
