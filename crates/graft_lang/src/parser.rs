//! The simple and enhanced parsers for `(( … ))` expression bodies.
//!
//! Two grammars share one scanner:
//!
//! - The **simple form** covers the bulk of real documents: an operator
//!   name followed by a flat list of literal/reference/env-var arguments.
//!   `||` between arguments builds an [`Expr::Alternation`]; an
//!   alternation branch that begins with a known operator name parses as
//!   a nested call consuming the remainder of its branch.
//! - The **enhanced form** is a Pratt parser adding grouping parentheses,
//!   parenthesized nested calls, arithmetic, comparison, boolean logic,
//!   and right-associative ternaries.
//!
//! The enhanced form is selected when the body contains a grouping paren
//! or any arithmetic/comparison/boolean/ternary token, or when
//! [`ParseOptions::force_enhanced`] is set.
//!
//! # Alternation vs boolean or
//!
//! Both spellings are `||`. In operator-call argument context `||` means
//! alternation (first branch that *resolves*); inside a `calc` body it
//! means boolean or (first *truthy* operand). The parser tracks that
//! context while descending into nested calls, so
//! `(( calc (grab a.flag) || 1 ))` gets a boolean or while
//! `(( concat (grab a || b) ".x" ))` gets an alternation.

use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::token::{Scanner, Token, TokenKind};
use graft_base::{Error, Pos, Result};
use graft_tree::Segment;
use std::collections::HashSet;
use std::sync::Arc;

/// Caller-supplied parsing context.
///
/// The parser has no registry of its own; the engine passes the set of
/// registered operator names so nested calls can be recognized.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// File attributed to positions and errors, when known.
    pub file: Option<Arc<str>>,
    /// Skip the heuristic and always use the enhanced parser.
    pub force_enhanced: bool,
    /// Registered operator names (case-sensitive).
    pub operator_names: HashSet<String>,
}

impl ParseOptions {
    pub fn with_operators(names: &[&str]) -> ParseOptions {
        ParseOptions {
            operator_names: names.iter().map(|s| s.to_string()).collect(),
            ..ParseOptions::default()
        }
    }

    pub fn is_operator(&self, name: &str) -> bool {
        self.operator_names.contains(name)
    }
}

/// True if the string leaf is shaped like an operator expression.
pub fn is_opcall(source: &str) -> bool {
    opcall_body(source).is_some()
}

/// Extracts the body of a `(( … ))` leaf, together with the character
/// offset of the body within the leaf (for error columns). The whole
/// trimmed leaf must be one operator expression; strings merely
/// containing `((` somewhere are not opcalls.
pub fn opcall_body(source: &str) -> Option<(&str, usize)> {
    let trimmed = source.trim();
    let inner = trimmed.strip_prefix("((")?.strip_suffix("))")?;
    let leading_ws = source.len() - source.trim_start().len();
    let offset = source[..leading_ws].chars().count() + 2;
    Some((inner, offset))
}

/// True if the text still contains an (unevaluated) operator expression.
pub fn contains_opcall(text: &str) -> bool {
    match text.find("((") {
        Some(start) => text[start..].contains("))"),
        None => false,
    }
}

/// Parses one `(( … ))` string leaf into an expression.
///
/// The result is always an [`Expr::Call`]; a body that does not begin
/// with an operator name is a parse error (`(( ))` included).
pub fn parse_expression(source: &str, opts: &ParseOptions) -> Result<Expr> {
    let (body, offset) = opcall_body(source).ok_or_else(|| {
        Error::parse("not an operator expression".to_string())
            .with_source_line(source.to_string())
    })?;

    let tokens = Scanner::new(body, offset as u32 + 1, opts.file.clone()).scan()?;
    if tokens.is_empty() {
        return Err(Error::parse("missing operator name in (( )) expression")
            .with_source_line(source.to_string()));
    }

    // `calc` bodies are always full expressions, trigger tokens or not.
    let head_is_calc = matches!(&tokens[0].kind, TokenKind::Ident(name) if name == "calc");
    let enhanced = opts.force_enhanced
        || head_is_calc
        || tokens.iter().any(|t| t.kind.is_enhanced_trigger());

    let mut parser = Parser {
        tokens,
        index: 0,
        opts,
        source: source.to_string(),
    };
    let expr = if enhanced {
        parser.parse_enhanced_call()?
    } else {
        parser.parse_simple_call()?
    };
    parser.expect_eof()?;
    Ok(expr)
}

/// Parses a bare expression body (no `(( ))` wrapper, no operator-name
/// head) in the boolean-or context. Used by `calc` to evaluate a quoted
/// expression string at run time.
pub fn parse_subexpression(source: &str, opts: &ParseOptions) -> Result<Expr> {
    let tokens = Scanner::new(source, 1, opts.file.clone()).scan()?;
    if tokens.is_empty() {
        return Err(Error::parse("empty expression").with_source_line(source.to_string()));
    }
    let mut parser = Parser {
        tokens,
        index: 0,
        opts,
        source: source.to_string(),
    };
    let expr = parser.parse_expr(0, true)?;
    parser.expect_eof()?;
    Ok(expr)
}

/// The operator name heading a nested-call alternation branch, if the
/// group is shaped like one. A single bare word stays a reference; only
/// a word followed by arguments reads as a call.
fn nested_call_head(group: &[Expr], opts: &ParseOptions) -> Option<String> {
    if group.len() < 2 {
        return None;
    }
    let Expr::Reference(path, _) = &group[0] else {
        return None;
    };
    let [Segment::Key(word)] = path.segments() else {
        return None;
    };
    if opts.is_operator(word) {
        Some(word.clone())
    } else {
        None
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    opts: &'a ParseOptions,
    source: String,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn at_eof(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn error_at(&self, pos: Pos, message: impl Into<String>) -> Error {
        Error::parse(message)
            .with_pos(pos)
            .with_source_line(self.source.clone())
    }

    fn error_here(&self, message: impl Into<String>) -> Error {
        let pos = self
            .peek()
            .map(|t| t.pos.clone())
            .unwrap_or_else(|| Pos::new(1, self.source.chars().count() as u32));
        self.error_at(pos, message)
    }

    fn expect_eof(&self) -> Result<()> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.error_here("unexpected trailing tokens in expression"))
        }
    }

    fn expect_operator_name(&mut self) -> Result<(String, Pos)> {
        match self.bump() {
            Some(Token {
                kind: TokenKind::Ident(name),
                pos,
            }) => Ok((name, pos)),
            Some(token) => {
                Err(self.error_at(token.pos, "expected an operator name to start the expression"))
            }
            None => Err(self.error_here("missing operator name in (( )) expression")),
        }
    }

    // ------------------------------------------------------------------
    // Simple form
    // ------------------------------------------------------------------

    /// `name arg… [|| arg… …]` — a top-level `||` splits the whole
    /// argument list into alternation groups: `vault "a" x || "def"`
    /// tries `vault "a" x` first, then falls back to `"def"`.
    fn parse_simple_call(&mut self) -> Result<Expr> {
        let (name, pos) = self.expect_operator_name()?;
        let mut groups: Vec<Vec<Expr>> = vec![Vec::new()];
        while !self.at_eof() {
            if self.eat(&TokenKind::OrOr) {
                groups.push(Vec::new());
                continue;
            }
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            let expr = self.parse_primary()?;
            groups.last_mut().expect("at least one group").push(expr);
        }
        self.build_call(name, pos, groups)
    }

    /// Assembles a call from its `||`-separated argument groups. With a
    /// single group the call is direct; with several, the call gets one
    /// alternation argument whose branches are the groups — a group with
    /// multiple expressions (or a leading operator name) becomes a
    /// nested call so the whole group resolves or fails as a unit.
    fn build_call(&self, name: String, pos: Pos, mut groups: Vec<Vec<Expr>>) -> Result<Expr> {
        if groups.len() == 1 {
            return Ok(Expr::Call {
                name,
                args: groups.pop().expect("one group"),
                pos,
            });
        }
        let mut branches = Vec::with_capacity(groups.len());
        for group in groups {
            branches.push(self.group_to_branch(&name, &pos, group)?);
        }
        Ok(Expr::Call {
            name,
            args: vec![Expr::Alternation {
                branches,
                pos: pos.clone(),
            }],
            pos,
        })
    }

    fn group_to_branch(&self, parent: &str, pos: &Pos, group: Vec<Expr>) -> Result<Expr> {
        if group.is_empty() {
            return Err(self.error_at(pos.clone(), "empty alternation branch"));
        }
        // A branch headed by a known operator name is a nested call.
        if let Some(head) = nested_call_head(&group, self.opts) {
            return Ok(Expr::Call {
                name: head,
                args: group[1..].to_vec(),
                pos: group[0].pos().clone(),
            });
        }
        if group.len() == 1 {
            return Ok(group.into_iter().next().expect("one expression"));
        }
        Ok(Expr::Call {
            name: parent.to_string(),
            args: group,
            pos: pos.clone(),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self
            .bump()
            .ok_or_else(|| self.error_here("unexpected end of expression"))?;
        let pos = token.pos.clone();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Literal(graft_tree::Value::Int(n), pos)),
            TokenKind::Float(x) => Ok(Expr::Literal(graft_tree::Value::Float(x), pos)),
            TokenKind::Str(s) => Ok(Expr::Literal(graft_tree::Value::String(s), pos)),
            TokenKind::Bool(b) => Ok(Expr::Literal(graft_tree::Value::Bool(b), pos)),
            TokenKind::Nil => Ok(Expr::Literal(graft_tree::Value::Null, pos)),
            TokenKind::EnvVar(name) => Ok(Expr::EnvVar(name, pos)),
            TokenKind::Reference(text) => {
                let path = graft_tree::Path::parse(&text)
                    .map_err(|e| self.error_at(pos.clone(), e.message))?;
                Ok(Expr::Reference(path, pos))
            }
            TokenKind::Ident(word) => {
                let path = graft_tree::Path::parse(&word)
                    .map_err(|e| self.error_at(pos.clone(), e.message))?;
                Ok(Expr::Reference(path, pos))
            }
            other => Err(self.error_at(pos, format!("unexpected token {other:?} in argument list"))),
        }
    }

    // ------------------------------------------------------------------
    // Enhanced form
    // ------------------------------------------------------------------

    fn parse_enhanced_call(&mut self) -> Result<Expr> {
        let (name, pos) = self.expect_operator_name()?;
        if name == "calc" {
            // One expression context; `||` is boolean or.
            let mut args = Vec::new();
            while !self.at_eof() {
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                args.push(self.parse_expr(0, true)?);
            }
            return Ok(Expr::Call { name, args, pos });
        }

        // As in the simple form, a top-level `||` separates alternation
        // groups. Arguments are parsed above `||`'s binding power so the
        // group boundary stays visible here; parenthesized
        // sub-expressions still handle `||` internally.
        let mut groups: Vec<Vec<Expr>> = vec![Vec::new()];
        while !self.at_eof() {
            if self.eat(&TokenKind::OrOr) {
                groups.push(Vec::new());
                continue;
            }
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            let expr = self.parse_expr(5, false)?;
            groups.last_mut().expect("at least one group").push(expr);
        }
        self.build_call(name, pos, groups)
    }

    /// Pratt loop. Binding powers, loosest to tightest: ternary (2),
    /// `||` (4), `&&` (6), equality (8), comparison (10), additive (12),
    /// multiplicative (14).
    fn parse_expr(&mut self, min_bp: u8, boolean_or: bool) -> Result<Expr> {
        let mut lhs = self.parse_unary(boolean_or)?;

        loop {
            let Some(kind) = self.peek_kind() else { break };
            let (bp, op) = match kind {
                TokenKind::Question => (2, None),
                TokenKind::OrOr => (4, Some(BinaryOp::Or)),
                TokenKind::AndAnd => (6, Some(BinaryOp::And)),
                TokenKind::EqEq => (8, Some(BinaryOp::Eq)),
                TokenKind::BangEq => (8, Some(BinaryOp::Ne)),
                TokenKind::Lt => (10, Some(BinaryOp::Lt)),
                TokenKind::Le => (10, Some(BinaryOp::Le)),
                TokenKind::Gt => (10, Some(BinaryOp::Gt)),
                TokenKind::Ge => (10, Some(BinaryOp::Ge)),
                TokenKind::Plus => (12, Some(BinaryOp::Add)),
                TokenKind::Minus => (12, Some(BinaryOp::Sub)),
                TokenKind::Star => (14, Some(BinaryOp::Mul)),
                TokenKind::Slash => (14, Some(BinaryOp::Div)),
                TokenKind::Percent => (14, Some(BinaryOp::Mod)),
                _ => break,
            };
            if bp < min_bp {
                break;
            }
            let token = self.bump().expect("peeked token");
            let pos = token.pos;

            match op {
                None => {
                    // Ternary, right-associative.
                    let then = self.parse_expr(0, boolean_or)?;
                    if !self.eat(&TokenKind::Colon) {
                        return Err(self.error_here("expected ':' in ternary expression"));
                    }
                    let otherwise = self.parse_expr(2, boolean_or)?;
                    lhs = Expr::Ternary {
                        cond: Box::new(lhs),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                        pos,
                    };
                }
                Some(BinaryOp::Or) if !boolean_or => {
                    // Alternation context: chain, allowing a bare nested
                    // call to head the branch (same as the simple form).
                    let rhs = self.parse_enhanced_alternation_branch()?;
                    lhs = match lhs {
                        Expr::Alternation { mut branches, pos } => {
                            branches.push(rhs);
                            Expr::Alternation { branches, pos }
                        }
                        other => Expr::Alternation {
                            pos: other.pos().clone(),
                            branches: vec![other, rhs],
                        },
                    };
                }
                Some(op) => {
                    let rhs = self.parse_expr(bp + 1, boolean_or)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        pos,
                    };
                }
            }
        }
        Ok(lhs)
    }

    fn parse_enhanced_alternation_branch(&mut self) -> Result<Expr> {
        if let Some(TokenKind::Ident(word)) = self.peek_kind() {
            let next_is_paren = self
                .tokens
                .get(self.index + 1)
                .map(|t| t.kind == TokenKind::LParen)
                .unwrap_or(false);
            if self.opts.is_operator(word) && !next_is_paren {
                let (name, pos) = self.expect_operator_name()?;
                let mut args = Vec::new();
                while !self.at_eof()
                    && !matches!(
                        self.peek_kind(),
                        Some(TokenKind::OrOr) | Some(TokenKind::RParen) | Some(TokenKind::Comma)
                    )
                {
                    args.push(self.parse_primary()?);
                }
                return Ok(Expr::Call { name, args, pos });
            }
        }
        self.parse_expr(6, false)
    }

    fn parse_unary(&mut self, boolean_or: bool) -> Result<Expr> {
        if let Some(token) = self.peek() {
            let pos = token.pos.clone();
            match token.kind {
                TokenKind::Bang => {
                    self.index += 1;
                    let operand = self.parse_unary(boolean_or)?;
                    return Ok(Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                        pos,
                    });
                }
                TokenKind::Minus => {
                    self.index += 1;
                    let operand = self.parse_unary(boolean_or)?;
                    return Ok(Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                        pos,
                    });
                }
                _ => {}
            }
        }
        self.parse_enhanced_primary(boolean_or)
    }

    fn parse_enhanced_primary(&mut self, boolean_or: bool) -> Result<Expr> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.index += 1;
                let inner = self.parse_grouped(boolean_or)?;
                if !self.eat(&TokenKind::RParen) {
                    return Err(self.error_here("expected ')' to close group"));
                }
                Ok(inner)
            }
            Some(TokenKind::Ident(word)) => {
                let is_call = self
                    .tokens
                    .get(self.index + 1)
                    .map(|t| t.kind == TokenKind::LParen)
                    .unwrap_or(false)
                    && self.opts.is_operator(word);
                if is_call {
                    let (name, pos) = self.expect_operator_name()?;
                    self.index += 1; // consume '('
                    let nested_boolean = name == "calc";
                    let mut args = Vec::new();
                    if self.peek_kind() != Some(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr(0, nested_boolean)?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    if !self.eat(&TokenKind::RParen) {
                        return Err(self.error_here("expected ')' to close call arguments"));
                    }
                    Ok(Expr::Call { name, args, pos })
                } else {
                    self.parse_primary()
                }
            }
            _ => self.parse_primary(),
        }
    }

    /// Inside grouping parens a bare operator name may head a nested
    /// call in the simple juxtaposed style: `(( concat (grab a) ".x" ))`.
    fn parse_grouped(&mut self, boolean_or: bool) -> Result<Expr> {
        if let Some(TokenKind::Ident(word)) = self.peek_kind() {
            let next_is_paren = self
                .tokens
                .get(self.index + 1)
                .map(|t| t.kind == TokenKind::LParen)
                .unwrap_or(false);
            let next_is_rparen = self
                .tokens
                .get(self.index + 1)
                .map(|t| t.kind == TokenKind::RParen)
                .unwrap_or(true);
            if self.opts.is_operator(word) && !next_is_paren && !next_is_rparen {
                let (name, pos) = self.expect_operator_name()?;
                let nested_boolean = name == "calc";
                let mut args = Vec::new();
                while !self.at_eof() && self.peek_kind() != Some(&TokenKind::RParen) {
                    if self.eat(&TokenKind::Comma) {
                        continue;
                    }
                    args.push(self.parse_expr(0, nested_boolean)?);
                }
                return Ok(Expr::Call { name, args, pos });
            }
        }
        self.parse_expr(0, boolean_or)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_tree::Value;

    fn opts() -> ParseOptions {
        ParseOptions::with_operators(&[
            "grab", "concat", "calc", "vault", "static_ips", "ips", "join", "empty",
        ])
    }

    fn parse(src: &str) -> Expr {
        parse_expression(src, &opts()).unwrap()
    }

    #[test]
    fn detects_opcalls() {
        assert!(is_opcall("(( grab a ))"));
        assert!(is_opcall("  (( grab a ))  "));
        assert!(!is_opcall("plain text"));
        assert!(!is_opcall("has (( inner )) but prefixed"));
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(parse_expression("(( ))", &opts()).is_err());
    }

    #[test]
    fn body_must_start_with_operator_name() {
        assert!(parse_expression("(( 2 + 3 ))", &opts()).is_err());
    }

    #[test]
    fn simple_grab_with_reference() {
        let expr = parse("(( grab meta.name ))");
        let Expr::Call { name, args, .. } = expr else { panic!() };
        assert_eq!(name, "grab");
        assert!(matches!(args[0], Expr::Reference(..)));
    }

    #[test]
    fn alternation_with_literal_fallback() {
        let expr = parse("(( grab a.b || \"x\" ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Alternation { branches, .. } = &args[0] else { panic!() };
        assert_eq!(branches.len(), 2);
        assert!(branches[1].is_literal());
    }

    #[test]
    fn alternation_branch_with_nested_call() {
        let expr = parse("(( grab missing || grab a ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Alternation { branches, .. } = &args[0] else { panic!() };
        assert!(matches!(&branches[1], Expr::Call { name, .. } if name == "grab"));
    }

    #[test]
    fn alternation_splits_whole_argument_groups() {
        let expr = parse("(( vault \"secret/\" meta.env \":key\" || \"default\" ))");
        let Expr::Call { name, args, .. } = expr else { panic!() };
        assert_eq!(name, "vault");
        assert_eq!(args.len(), 1);
        let Expr::Alternation { branches, .. } = &args[0] else { panic!() };
        assert_eq!(branches.len(), 2);
        assert!(
            matches!(&branches[0], Expr::Call { name, args, .. } if name == "vault" && args.len() == 3)
        );
        assert!(branches[1].is_literal());
    }

    #[test]
    fn subexpression_parses_quoted_calc_bodies() {
        let expr = parse_subexpression("2 + 3 * 4", &opts()).unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn concat_multiple_args() {
        let expr = parse("(( concat meta.app \"-\" meta.v ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn calc_precedence() {
        // 2 + 3 * 4 parses as 2 + (3 * 4)
        let expr = parse("(( calc 2 + 3 * 4 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert_eq!(args.len(), 1);
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = &args[0] else { panic!() };
        assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn calc_left_associative_subtraction() {
        // 10 - 5 - 2 parses as (10 - 5) - 2
        let expr = parse("(( calc 10 - 5 - 2 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Binary { op: BinaryOp::Sub, lhs, .. } = &args[0] else { panic!() };
        assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn calc_or_is_boolean_not_alternation() {
        let expr = parse("(( calc a || 1 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert!(matches!(&args[0], Expr::Binary { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn grouping_parens_override_precedence() {
        let expr = parse("(( calc (2 + 3) * 4 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Binary { op: BinaryOp::Mul, lhs, .. } = &args[0] else { panic!() };
        assert!(matches!(**lhs, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn ternary_right_associative() {
        let expr = parse("(( calc a ? 1 : b ? 2 : 3 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Ternary { otherwise, .. } = &args[0] else { panic!() };
        assert!(matches!(**otherwise, Expr::Ternary { .. }));
    }

    #[test]
    fn comparison_binds_tighter_than_ternary() {
        let expr = parse("(( calc x >= 3 ? \"big\" : \"small\" ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        let Expr::Ternary { cond, .. } = &args[0] else { panic!() };
        assert!(matches!(**cond, Expr::Binary { op: BinaryOp::Ge, .. }));
    }

    #[test]
    fn unary_not_and_neg() {
        let expr = parse("(( calc !a && -b < 0 ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert!(matches!(&args[0], Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn nested_parenthesized_call() {
        let expr = parse("(( concat (grab meta.app) \"-suffix\" ))");
        let Expr::Call { name, args, .. } = expr else { panic!() };
        assert_eq!(name, "concat");
        assert!(matches!(&args[0], Expr::Call { name, .. } if name == "grab"));
    }

    #[test]
    fn call_paren_syntax() {
        let expr = parse("(( concat grab(meta.app) \"-x\" ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert!(matches!(&args[0], Expr::Call { name, .. } if name == "grab"));
    }

    #[test]
    fn negative_int_argument_stays_simple() {
        // A leading '-' on a number must not push `ips` into calc-style parsing.
        let expr = parse("(( ips \"10.0.0.0/24\" -1 ))");
        let Expr::Call { name, args, .. } = expr else { panic!() };
        assert_eq!(name, "ips");
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1], Expr::Literal(Value::Int(-1), _)));
    }

    #[test]
    fn env_var_argument() {
        let expr = parse("(( concat \"home=\" $HOME ))");
        let Expr::Call { args, .. } = expr else { panic!() };
        assert!(matches!(&args[1], Expr::EnvVar(name, _) if name == "HOME"));
    }

    #[test]
    fn unknown_operator_still_parses() {
        let expr = parse("(( frobnicate a b ))");
        assert!(matches!(expr, Expr::Call { name, .. } if name == "frobnicate"));
    }

    #[test]
    fn contains_opcall_detects_unevaluated_text() {
        assert!(contains_opcall("prefix (( grab a )) suffix"));
        assert!(!contains_opcall("nothing here"));
    }

    #[test]
    fn error_carries_position_and_source_line() {
        let err = parse_expression("(( grab a | b ))", &opts()).unwrap_err();
        assert!(err.pos.is_some());
        assert!(err.source_line.as_deref().unwrap().contains("grab a | b"));
    }
}
