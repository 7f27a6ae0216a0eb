//! `(( param msg ))` — a required value the caller must override.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response, TrackedDependency};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Path;

/// Always fails with its message: the document demands this key be
/// overridden by a later merge document. Runs in the Param phase, after
/// merging is complete.
pub struct Param;

impl Operator for Param {
    fn phase(&self) -> Phase {
        Phase::Param
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        _auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        Vec::new()
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let message = ctx
            .resolve_string(&args[0])
            .unwrap_or_else(|_| args[0].to_string());
        Err(Error::validation(message))
    }
}
