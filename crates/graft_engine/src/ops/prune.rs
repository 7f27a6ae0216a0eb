//! `(( prune [path…] ))` — post-evaluation removal marker.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response, TrackedDependency};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::{Path, Value};

/// Registers its own location (and any argument paths) for removal once
/// evaluation finishes. The leaf itself becomes `null` until the prune
/// pass deletes it.
pub struct Prune;

impl Operator for Prune {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (0, -1)
    }

    /// Prune targets are removed, not read; they are not dependencies.
    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        _auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        Vec::new()
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        ctx.state.register_prune(ctx.here.clone());
        for arg in args {
            let path = match arg {
                Expr::Reference(path, _) => path.clone(),
                Expr::Literal(Value::String(s), _) => Path::parse(s)?,
                other => {
                    return Err(Error::validation(format!(
                        "prune arguments must be paths, got {other}"
                    )))
                }
            };
            ctx.state.register_prune(path);
        }
        Ok(Response::replace(Value::Null))
    }
}
