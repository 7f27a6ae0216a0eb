//! Error types with kind, position, and document-path context.
//!
//! All fallible operations in graft return [`Error`], a single struct
//! carrying an [`ErrorKind`] plus optional context: the source position of
//! the offending expression, the source line it appeared on, and the
//! document path (`$.a.b[0]`) the evaluator was working at.
//!
//! Evaluation does not stop at the first failure. Independent subtrees
//! keep evaluating and their failures are collected into a [`MultiError`],
//! which renders the report format consumers parse:
//!
//! ```text
//! 2 error(s) detected:
//!  - $.jobs.api.password: secret/api:password not found
//!  - $.meta.size: $.meta.pool could not be found in the datastructure
//! ```
//!
//! Entries are ordered by path so the report is stable across runs.

use crate::pos::Pos;
use std::fmt;

/// Which external collaborator an [`ErrorKind::External`] error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSource {
    Vault,
    Aws,
    File,
}

impl ExternalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalSource::Vault => "vault",
            ExternalSource::Aws => "aws",
            ExternalSource::File => "file",
        }
    }
}

/// Classification of a graft failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed source text: document syntax or `(( … ))` expressions.
    Parse,
    /// Structurally valid input that violates a contract (arity, types).
    Validation,
    /// A failure while running the merge/eval pipeline itself.
    Evaluation,
    /// A path that could not be resolved in the document.
    Reference,
    /// An operator reported a failure (or panicked).
    Operator,
    /// An external store or the filesystem failed.
    External(ExternalSource),
    /// The dependency graph contains an unbreakable cycle.
    Cycle,
    /// A cancellation token fired mid-flight.
    Cancelled,
    /// A transaction commit lost the optimistic-concurrency race.
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Validation => "validation",
            ErrorKind::Evaluation => "evaluation",
            ErrorKind::Reference => "reference",
            ErrorKind::Operator => "operator",
            ErrorKind::External(src) => src.as_str(),
            ErrorKind::Cycle => "cycle",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Conflict => "conflict",
        }
    }
}

/// An error with optional source-position and document-path context.
#[derive(Debug, Clone)]
pub struct Error {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Where in the source text the failure originates, when known.
    pub pos: Option<Pos>,
    /// The source line containing the failure, when available.
    pub source_line: Option<String>,
    /// The document path (`$.a.b`) the failure is attached to.
    pub path: Option<String>,
}

impl Error {
    /// Creates an error of the given kind with no context attached.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pos: None,
            source_line: None,
            path: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, message)
    }

    pub fn operator(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Operator, message)
    }

    pub fn external(source: ExternalSource, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External(source), message)
    }

    pub fn cycle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cycle, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Attaches a source position.
    pub fn with_pos(mut self, pos: Pos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Attaches the source line the failure occurred on.
    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }

    /// Attaches the document path the failure is reported under.
    ///
    /// The first path sticks: the evaluator annotates errors on the way
    /// out and the innermost cursor is the one worth reporting.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    /// True if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(pos) = &self.pos {
            write!(f, " at {pos}")?;
        }
        if let Some(line) = &self.source_line {
            write!(f, "\n    {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// An ordered collection of errors gathered across one evaluation phase.
///
/// Push errors as subtrees fail; at the end of the phase, [`MultiError::into_result`]
/// converts an empty collection into `Ok(())` and a non-empty one into itself.
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error to the report.
    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    /// Merges another report into this one.
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// True if any collected error has the given kind.
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// `Ok(())` when empty, `Err(self)` otherwise.
    pub fn into_result(self) -> std::result::Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) detected:", self.errors.len())?;
        // Stable report ordering: by path, pathless entries last.
        let mut sorted: Vec<&Error> = self.errors.iter().collect();
        sorted.sort_by(|a, b| match (&a.path, &b.path) {
            (Some(pa), Some(pb)) => pa.cmp(pb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.message.cmp(&b.message),
        });
        for err in sorted {
            match &err.path {
                Some(path) => writeln!(f, " - {}: {}", path, err.message)?,
                None => writeln!(f, " - {}", err.message)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<Error> for MultiError {
    fn from(err: Error) -> Self {
        MultiError { errors: vec![err] }
    }
}
