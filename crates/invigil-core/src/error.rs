//! Backend error taxonomy.
//!
//! Defined in `invigil-core` so the session, autosave, and submission
//! engines can classify failures without string matching on messages.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a [`crate::traits::QuizBackend`] implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Credential missing, expired, or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The quiz or attempt does not exist, or is not visible to this user.
    #[error("not found: {0}")]
    NotFound(String),

    /// A new attempt was refused because every allowed attempt is used up.
    #[error("attempt limit reached: {0}")]
    AttemptLimitReached(String),

    /// A new attempt was refused because an unsubmitted one is still open.
    #[error("an unsubmitted attempt is still open: {0}")]
    AttemptOpen(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not reach the backend.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with an error status.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The response arrived but could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    /// True for transient failures that a retry may resolve. Client errors
    /// and refusals are final; retrying them would only repeat the refusal.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout(_) | BackendError::Network(_) => true,
            BackendError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the learner's credential is the problem. Callers should
    /// stop issuing requests until it is refreshed.
    pub fn is_auth(&self) -> bool {
        matches!(self, BackendError::Unauthorized(_))
    }
}
