//! Cooperative cancellation.
//!
//! The evaluator performs no I/O and never blocks, so cancellation is a
//! polling capability: long-running solves check the token at each
//! recursive entry and each subtype map, and unwind by returning an error
//! the caller turns into a rolled-back context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The operation was cancelled by the embedder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cancelled;

/// Shared cancellation flag. Clones observe the same state.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Poll point for long-running judgments.
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
    fn token_observes_cancellation_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert_eq!(token.check(), Ok(()));
        clone.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }
}
