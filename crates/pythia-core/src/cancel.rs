//! Cooperative cancellation.
//!
//! The analysis worker checks a [`CancellationToken`] at unit boundaries,
//! between top-level statements of large units, and before file reads.
//! Cancellation is not an error condition inside the engine: pending work
//! is dropped and [`Cancelled`] propagates to the caller, leaving the
//! lattice in its most recent unit-boundary state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Signal raised to the caller when analysis was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("analysis cancelled")]
pub struct Cancelled;

/// A cloneable cancellation flag shared between the caller and the
/// analysis worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Return `Err(Cancelled)` when cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(Cancelled));
    }
}
