//! `(( empty kind ))` / `(( null ))` — type-appropriate empty values.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::{Segment, Value};

/// Yields an empty map, list, or string by kind name.
pub struct Empty;

impl Operator for Empty {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, _ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let kind = kind_word(&args[0]).ok_or_else(|| {
            Error::validation("empty operator requires a kind: hash, map, array, list, or string")
        })?;
        let value = match kind.as_str() {
            "hash" | "map" => Value::empty_map(),
            "array" | "list" => Value::empty_list(),
            "string" => Value::String(String::new()),
            other => {
                return Err(Error::validation(format!(
                    "unknown empty kind '{other}' (expected hash, map, array, list, or string)"
                )))
            }
        };
        Ok(Response::replace(value))
    }
}

/// The kind argument arrives as a bare word (parsed as a one-key
/// reference) or a quoted string.
fn kind_word(arg: &Expr) -> Option<String> {
    match arg {
        Expr::Literal(Value::String(s), _) => Some(s.clone()),
        Expr::Reference(path, _) => match path.segments() {
            [Segment::Key(word)] => Some(word.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Yields `null`.
pub struct Null;

impl Operator for Null {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (0, 0)
    }

    fn run(&self, _ctx: &OpContext<'_>, _args: &[Expr]) -> Result<Response> {
        Ok(Response::replace(Value::Null))
    }
}
