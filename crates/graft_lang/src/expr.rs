//! The typed expression tree produced by the parser.
//!
//! Every variant carries the [`Pos`] of its first token so failures can
//! point back into the `(( … ))` source. [`Expr`]'s `Display` impl
//! re-serializes an expression to source text; the `defer` operator
//! relies on this to emit its arguments unevaluated.

use graft_base::Pos;
use graft_tree::{Path, Segment, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    /// Boolean and: first falsy operand.
    And,
    /// Boolean or: first truthy operand. Distinct from alternation.
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A parsed `(( … ))` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value, Pos),
    /// A tree reference (`meta.name`, `jobs[0].port`, `$.a.b`).
    Reference(Path, Pos),
    /// An environment-variable reference (`$HOME`).
    EnvVar(String, Pos),
    /// An operator call: `name arg1 arg2 …`.
    Call {
        name: String,
        args: Vec<Expr>,
        pos: Pos,
    },
    /// `a || b || c` in operator-call context: the first branch that
    /// resolves without error wins.
    Alternation { branches: Vec<Expr>, pos: Pos },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: Pos,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Pos,
    },
    /// `cond ? then : otherwise`, right-associative.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        pos: Pos,
    },
}

impl Expr {
    pub fn pos(&self) -> &Pos {
        match self {
            Expr::Literal(_, pos)
            | Expr::Reference(_, pos)
            | Expr::EnvVar(_, pos)
            | Expr::Call { pos, .. }
            | Expr::Alternation { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Ternary { pos, .. } => pos,
        }
    }

    /// True for plain literals (the short-circuit case of alternation).
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(..))
    }

    /// Collects every tree reference in this expression, depth-first.
    pub fn references(&self) -> Vec<&Path> {
        let mut found = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Reference(path, _) = e {
                found.push(path);
            }
        });
        found
    }

    /// Depth-first traversal over this expression and all children.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(..) | Expr::Reference(..) | Expr::EnvVar(..) => {}
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Alternation { branches, .. } => {
                for branch in branches {
                    branch.walk(visit);
                }
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => {
                cond.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
        }
    }
}

/// Renders a reference path in source form (no `$.` root marker).
fn render_ref(path: &Path, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if path.is_root() {
        return write!(f, "$.");
    }
    for (i, segment) in path.segments().iter().enumerate() {
        match segment {
            Segment::Index(n) => write!(f, "[{n}]")?,
            other => {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{other}")?;
            }
        }
    }
    Ok(())
}

fn render_literal(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Null => write!(f, "nil"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value, _) => render_literal(value, f),
            Expr::Reference(path, _) => render_ref(path, f),
            Expr::EnvVar(name, _) => write!(f, "${name}"),
            Expr::Call { name, args, .. } => {
                write!(f, "{name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Expr::Alternation { branches, .. } => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{branch}")?;
                }
                Ok(())
            }
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                write!(f, "{lhs} {} {rhs}", op.symbol())
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                ..
            } => write!(f, "{cond} ? {then} : {otherwise}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: Value) -> Expr {
        Expr::Literal(v, Pos::new(1, 1))
    }

    #[test]
    fn display_round_trips_call_shape() {
        let expr = Expr::Call {
            name: "concat".into(),
            args: vec![
                Expr::Reference(Path::parse("meta.app").unwrap(), Pos::new(1, 8)),
                lit(Value::from("-")),
            ],
            pos: Pos::new(1, 1),
        };
        assert_eq!(expr.to_string(), "concat meta.app \"-\"");
    }

    #[test]
    fn display_renders_alternation() {
        let expr = Expr::Alternation {
            branches: vec![
                Expr::Reference(Path::parse("a").unwrap(), Pos::new(1, 1)),
                lit(Value::from("x")),
            ],
            pos: Pos::new(1, 1),
        };
        assert_eq!(expr.to_string(), "a || \"x\"");
    }

    #[test]
    fn display_renders_indices_attached() {
        let expr = Expr::Reference(Path::parse("jobs[0].port").unwrap(), Pos::new(1, 1));
        assert_eq!(expr.to_string(), "jobs[0].port");
    }

    #[test]
    fn references_collects_nested() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Reference(Path::parse("x").unwrap(), Pos::new(1, 1))),
            rhs: Box::new(Expr::Reference(Path::parse("y").unwrap(), Pos::new(1, 5))),
            pos: Pos::new(1, 1),
        };
        assert_eq!(expr.references().len(), 2);
    }
}
