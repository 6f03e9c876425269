//! Cooperative cancellation for long-running passes.
//!
//! The automaton core is single-threaded, but its passes can take a long time
//! on large programs. [`CancelToken`] lets a controlling thread request that a
//! pass stop: the pass polls the token at every work-list iteration via
//! [`checkpoint`](CancelToken::checkpoint) and unwinds with
//! [`Error::Cancelled`] without committing a partial automaton.
//!
//! Cancellation preempts every error tier and propagates without wrapping.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{Error, Result};

/// A shared, cloneable cancellation signal.
///
/// Cloning a token yields a handle to the same underlying flag, so a
/// controlling thread can keep one clone and hand another to the pass.
///
/// # Examples
///
/// ```rust
/// use flowscope::utils::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(token.checkpoint().is_ok());
///
/// token.cancel();
/// assert!(token.checkpoint().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raises the cancellation signal.
    ///
    /// All clones of this token observe the signal. Raising it more than once
    /// has no additional effect.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` if the signal has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Polls the signal, returning [`Error::Cancelled`] if it was raised.
    ///
    /// Passes call this once per work-list iteration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the signal has been raised.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint().is_ok());
    }

    #[test]
    fn test_cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        token.cancel();

        assert!(clone.is_cancelled());
        assert!(matches!(clone.checkpoint(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let token = CancelToken::new();
        let clone = token.clone();

        let handle = std::thread::spawn(move || clone.cancel());
        handle.join().unwrap();

        assert!(token.is_cancelled());
    }
}
