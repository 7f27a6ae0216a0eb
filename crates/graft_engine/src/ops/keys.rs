//! `(( keys mapping ))` — sorted key list of a mapping.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Yields the lexicographically sorted keys of a mapping.
pub struct Keys;

impl Operator for Keys {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let value = ctx.resolve(&args[0])?;
        let entries = value.as_map().ok_or_else(|| {
            Error::validation(format!(
                "keys operator requires a map, got {}",
                value.type_name()
            ))
        })?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(Response::replace(Value::list(
            keys.into_iter().map(Value::String).collect(),
        )))
    }
}
