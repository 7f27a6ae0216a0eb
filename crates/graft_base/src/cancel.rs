//! Cooperative cancellation with optional deadlines.
//!
//! Every long-running entry point in graft (parse, merge, evaluate)
//! accepts a [`CancelToken`] and tests it at phase boundaries and before
//! every external call. External adapters derive per-call deadlines from
//! the token via [`CancelToken::with_deadline`].
//!
//! Tokens are cheap to clone; clones share the cancellation flag. A child
//! token created with a deadline observes both its parent's flag and its
//! own deadline.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if let Some(parent) = &self.parent {
            if parent.is_cancelled() {
                return true;
            }
        }
        false
    }

    fn deadline_exceeded(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        if let Some(parent) = &self.parent {
            if parent.deadline_exceeded() {
                return true;
            }
        }
        false
    }
}

/// A cloneable handle used to abort work in flight.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that never fires until [`CancelToken::cancel`] is called.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Derives a child token that additionally fires once `timeout` has
    /// elapsed. Cancelling the parent cancels the child; not vice versa.
    pub fn with_deadline(&self, timeout: Duration) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    /// Signals every holder of this token (and derived children) to stop.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.inner.deadline_exceeded()
    }

    /// Returns a `Cancelled` error if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.inner.is_cancelled() {
            return Err(Error::cancelled("operation cancelled"));
        }
        if self.inner.deadline_exceeded() {
            return Err(Error::cancelled("deadline exceeded"));
        }
        Ok(())
    }

    /// Remaining time before the deadline, if one is set on this token.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes_check() {
        assert!(CancelToken::new().check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.check().is_err());
    }

    #[test]
    fn parent_cancel_reaches_deadline_child() {
        let parent = CancelToken::new();
        let child = parent.with_deadline(Duration::from_secs(60));
        assert!(child.check().is_ok());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_fails_check() {
        let token = CancelToken::new().with_deadline(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert!(token.deadline_exceeded());
        assert!(token.check().is_err());
    }

    #[test]
    fn child_cancel_does_not_reach_parent() {
        let parent = CancelToken::new();
        let child = parent.with_deadline(Duration::from_secs(60));
        child.cancel();
        assert!(!parent.is_cancelled());
    }
}
