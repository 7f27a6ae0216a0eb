//! Source location tracking for error reporting.
//!
//! A [`Pos`] names the line and column an expression token came from,
//! together with the file the document was read from when that is known.
//! Every token, expression, and expression error in graft carries one,
//! enabling messages that point at the exact offending `(( … ))` text.
//!
//! Lines and columns are 1-based; column counts characters, not bytes,
//! since operator expressions are short and the friendlier unit wins.

use std::fmt;
use std::sync::Arc;

/// A line/column location in a source document.
///
/// Cheap to clone; the optional file name is reference-counted so that
/// every token of a document shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pos {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
    /// Originating file, when the document came from one.
    pub file: Option<Arc<str>>,
}

impl Pos {
    /// Creates a position with no file attribution.
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col, file: None }
    }

    /// Creates a position inside a named file.
    pub fn in_file(line: u32, col: u32, file: impl Into<Arc<str>>) -> Self {
        Self {
            line,
            col,
            file: Some(file.into()),
        }
    }

    /// Returns a copy shifted right by `cols` columns on the same line.
    pub fn advance(&self, cols: u32) -> Pos {
        Pos {
            line: self.line,
            col: self.col + cols,
            file: self.file.clone(),
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.col),
            None => write!(f, "{}:{}", self.line, self.col),
        }
    }
}
