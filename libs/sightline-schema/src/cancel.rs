//! Cooperative cancellation tokens
//!
//! Plain atomics rather than a runtime-specific primitive: the token is
//! passed alongside every remote call, the remote source is asked to stop,
//! and a result that arrives anyway is discarded by the caller's generation
//! check.

use crate::FetchError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one fetch generation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Early-out helper for suspension points inside a fetch path.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        clone.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(FetchError::Cancelled));
    }
}
