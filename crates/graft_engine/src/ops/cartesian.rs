//! `(( cartesian-product lists… ))` — outer product of lists.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Builds every combination of one element per argument, concatenating
/// the stringified elements. Scalar arguments behave as one-element
/// lists.
pub struct CartesianProduct;

impl Operator for CartesianProduct {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let mut dimensions: Vec<Vec<String>> = Vec::with_capacity(args.len());
        for arg in args {
            let value = ctx.resolve(arg)?;
            let parts = match &value {
                Value::List(items) => items
                    .iter()
                    .map(|item| {
                        item.stringify().ok_or_else(|| {
                            Error::validation(format!(
                                "cartesian-product list elements must be scalars, got {}",
                                item.type_name()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                other => vec![other.stringify().ok_or_else(|| {
                    Error::validation(format!(
                        "cartesian-product arguments must be lists or scalars, got {}",
                        other.type_name()
                    ))
                })?],
            };
            dimensions.push(parts);
        }

        let mut combos: Vec<String> = vec![String::new()];
        for dimension in &dimensions {
            let mut next = Vec::with_capacity(combos.len() * dimension.len());
            for prefix in &combos {
                for part in dimension {
                    next.push(format!("{prefix}{part}"));
                }
            }
            combos = next;
        }

        Ok(Response::replace(Value::list(
            combos.into_iter().map(Value::String).collect(),
        )))
    }
}
