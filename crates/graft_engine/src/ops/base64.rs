//! `(( base64 v ))` / `(( base64-decode v ))` — codec pair.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Encodes a scalar's string form as standard base64.
pub struct Base64Encode;

impl Operator for Base64Encode {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 2)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        if args.len() == 2 {
            let encoding = ctx.resolve_string(&args[1])?;
            if encoding != "utf8" {
                return Err(Error::validation(format!(
                    "unsupported input encoding '{encoding}' (only utf8)"
                )));
            }
        }
        let text = ctx.resolve_string(&args[0])?;
        Ok(Response::replace(Value::String(STANDARD.encode(text))))
    }
}

/// Decodes standard base64 back to a UTF-8 string.
pub struct Base64Decode;

impl Operator for Base64Decode {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let text = ctx.resolve_string(&args[0])?;
        let bytes = STANDARD
            .decode(text.as_bytes())
            .map_err(|e| Error::validation(format!("invalid base64: {e}")))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|e| Error::validation(format!("decoded data is not UTF-8: {e}")))?;
        Ok(Response::replace(Value::String(decoded)))
    }
}
