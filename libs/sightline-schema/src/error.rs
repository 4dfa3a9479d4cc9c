//! Fetch error taxonomy

use thiserror::Error;

/// Failure classes for remote data fetches.
///
/// `Clone` so a single settled flight can hand the same outcome to every
/// waiter that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Retryable transport-level failure. Existing cached/display data is
    /// kept when this surfaces.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// Caller-initiated cancellation. Never surfaced to the user.
    #[error("request cancelled")]
    Cancelled,

    /// Malformed filter/resource input. Surfaced immediately, no retry.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The remote source returned an error payload.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
