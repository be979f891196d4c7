//! Session error types.

use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was invalidated and no longer accepts writes.
    #[error("Session invalidated: {0}")]
    Invalidated(String),

    /// An attribute could not be converted to or from its stored form.
    #[error("Session attribute '{key}' could not be converted: {source}")]
    Attribute {
        /// Attribute name.
        key: String,
        /// Conversion failure.
        #[source]
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Checks if this is an invalidation error.
    #[must_use]
    pub const fn is_invalidated(&self) -> bool {
        matches!(self, Self::Invalidated(_))
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
