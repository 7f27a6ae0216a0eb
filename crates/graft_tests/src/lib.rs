//! Integration test crate for graft.
//!
//! All tests live under `tests/`; the shared harness is
//! `tests/common/mod.rs`. This library target exists only so the crate
//! participates in the workspace.
