//! `(( calc expr ))` — arithmetic, comparison, and ternary evaluation.

use crate::context::{eval_arithmetic, OpContext};
use crate::op::{Operator, Phase, Response};
use graft_base::Result;
use graft_lang::parser::parse_subexpression;
use graft_lang::Expr;
use graft_tree::Value;

/// Evaluates a numeric/boolean expression over references. The argument
/// may also be a quoted expression string, parsed at run time.
pub struct Calc;

impl Operator for Calc {
    fn phase(&self) -> Phase {
        Phase::Eval
    }

    fn arity(&self) -> (usize, i64) {
        (1, 1)
    }

    fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> Result<Response> {
        let value = match &args[0] {
            Expr::Literal(Value::String(source), _) => {
                let opts = ctx
                    .registry
                    .parse_options(ctx.options.use_enhanced_parser);
                let parsed = parse_subexpression(source, &opts)?;
                eval_arithmetic(ctx, &parsed)?
            }
            other => eval_arithmetic(ctx, other)?,
        };
        Ok(Response::replace(value))
    }
}
