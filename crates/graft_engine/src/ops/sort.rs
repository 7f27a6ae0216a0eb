//! `(( sort [by field] ))` — registry entry for the merge-time marker.
//!
//! The real work happens in two other places: the merge engine
//! recognizes a right-hand `(( sort ))` leaf over a left-hand list and
//! registers the path, and the evaluator sorts registered paths after
//! the Eval phase. Reaching `run` means the marker appeared somewhere
//! without a list to act on, which is a usage error worth a pointed
//! message rather than an "unknown operator" fallthrough.

use crate::context::OpContext;
use crate::op::{Operator, Phase, Response, TrackedDependency};
use graft_base::{Error, Result};
use graft_lang::Expr;
use graft_tree::Path;

pub struct Sort;

impl Operator for Sort {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (0, 2)
    }

    fn dependencies(
        &self,
        _cursor: &Path,
        _args: &[Expr],
        _auto: Vec<TrackedDependency>,
    ) -> Vec<TrackedDependency> {
        Vec::new()
    }

    fn run(&self, _ctx: &OpContext<'_>, _args: &[Expr]) -> Result<Response> {
        Err(Error::validation(
            "sort must override an existing list during a merge (e.g. `releases: (( sort by name ))`)",
        ))
    }
}
