//! `(( file path ))` / `(( load path ))` — filesystem content.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Value;

/// Reads a file's contents as a string. Relative paths resolve against
/// the process working directory.
pub struct File;

impl Operator for File {
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
                    "unsupported file encoding '{encoding}' (only utf8)"
                )));
            }
        }
        let path = ctx.resolve_string(&args[0])?;
        ctx.cancel.check()?;
        let contents = graft_system::fs::read_file(&path)?;
        Ok(Response::replace(Value::String(contents)))
    }
}

/// Reads a file and parses it as YAML or JSON, replacing the call site
/// with the parsed structure.
pub struct Load;

impl Operator for Load {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let path = ctx.resolve_string(&args[0])?;
        ctx.cancel.check()?;
        let contents = graft_system::fs::read_file(&path)?;
        let value = crate::doc::parse_value(&contents, Some(&path))?;
        Ok(Response::replace(value))
    }
}
