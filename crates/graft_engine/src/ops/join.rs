//! `(( join sep list… ))` — string-join lists and scalars.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Joins the stringified elements of its list (or scalar) arguments
/// with a literal separator.
pub struct Join;

impl Operator for Join {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (2, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let separator = ctx.resolve_string(&args[0])?;
        let mut parts = Vec::new();
        for arg in &args[1..] {
            let value = ctx.resolve(arg)?;
            match &value {
                Value::List(items) => {
                    for item in items.iter() {
                        parts.push(item.stringify().ok_or_else(|| {
                            Error::validation(format!(
                                "cannot join a list containing a {}",
                                item.type_name()
                            ))
                        })?);
                    }
                }
                other => parts.push(other.stringify().ok_or_else(|| {
                    Error::validation(format!("cannot join a {}", other.type_name()))
                })?),
            }
        }
        Ok(Response::replace(Value::String(parts.join(&separator))))
    }
}
