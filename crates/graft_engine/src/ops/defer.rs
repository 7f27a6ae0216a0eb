//! `(( defer expr ))` — re-serialize the argument for a later pass.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response, TrackedDependency};
use graft_base::Result;
use graft_lang::Expr;
use graft_tree::{Path, Value};

/// Emits its arguments back as unevaluated `(( … ))` source text, so a
/// downstream tool (or a second run) evaluates them instead.
pub struct Defer;

impl Operator for Defer {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, -1)
    }

    /// The deferred expression is never evaluated here, so nothing it
    /// mentions is a dependency.
    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        _auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        Vec::new()
    }

    fn run(&self, _ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let body = args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Response::replace(Value::String(format!("(( {body} ))"))))
    }
}
