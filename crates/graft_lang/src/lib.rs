//! # graft-lang
//!
//! The `(( … ))` expression language embedded in document string leaves.
//!
//! - [`token`] — token classes and the hand-written scanner
//! - [`expr`] — the typed expression tree
//! - [`parser`] — the simple (flat) and enhanced (precedence) parsers
//!
//! # The Two Parser Forms
//!
//! Basic operator calls use the *simple form*: an operator name followed
//! by a flat list of literal, reference, and environment-variable
//! arguments, with `||` building alternation chains. The *enhanced form*
//! adds nested operator calls, grouping parentheses, and full
//! arithmetic/comparison/boolean expressions with ternaries; it is
//! selected heuristically (or forced via
//! [`parser::ParseOptions::force_enhanced`]).
//!
//! # Example
//!
//! ```
//! use graft_lang::parser::{parse_expression, ParseOptions};
//! use graft_lang::expr::Expr;
//!
//! let opts = ParseOptions::with_operators(&["grab", "concat"]);
//! let expr = parse_expression("(( grab meta.name || \"fallback\" ))", &opts).unwrap();
//! assert!(matches!(expr, Expr::Call { .. }));
//! ```

pub mod expr;
pub mod parser;
pub mod token;

pub use expr::{BinaryOp, Expr, UnaryOp};
pub use parser::{is_opcall, opcall_body, parse_expression, parse_subexpression, ParseOptions};
pub use token::{Token, TokenKind};
