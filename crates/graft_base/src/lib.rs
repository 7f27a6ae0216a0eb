//! # graft-base
//!
//! Pure structural atoms for the graft ecosystem.
//!
//! This crate provides the foundational types used throughout graft:
//!
//! - [`Pos`] — Source location tracking for expression errors
//! - [`Error`]/[`ErrorKind`]/[`Result`] — Errors with position and path context
//! - [`MultiError`] — Aggregated per-document error reports
//! - [`CancelToken`] — Cooperative cancellation with optional deadlines
//!
//! # Design Principles
//!
//! This crate has **no knowledge of documents, operators, or I/O**. It
//! provides only generic, reusable infrastructure that higher-level crates
//! build upon.
//!
//! # Example
//!
//! ```
//! use graft_base::{Error, Pos, Result};
//!
//! fn parse_count(s: &str) -> Result<i64> {
//!     s.parse()
//!         .map_err(|_| Error::parse(format!("invalid count: '{s}'")).with_pos(Pos::new(1, 1)))
//! }
//!
//! let err = parse_count("abc").unwrap_err();
//! assert!(err.to_string().contains("invalid count"));
//! ```

pub mod cancel;
pub mod error;
pub mod pos;

pub use cancel::CancelToken;
pub use error::{Error, ErrorKind, ExternalSource, MultiError, Result};
pub use pos::Pos;
