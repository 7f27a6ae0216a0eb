//! `(( concat v… ))` — string composition.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::Result;
use graft_lang::Expr;
use graft_tree::Value;

/// Stringifies each argument and concatenates the results.
pub struct Concat;

impl Operator for Concat {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let mut out = String::new();
        for arg in args {
            out.push_str(&ctx.resolve_string(arg)?);
        }
        Ok(Response::replace(Value::String(out)))
    }
}
