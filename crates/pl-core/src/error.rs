//! Core error handling.
//!
//! Messages stay informative for operators without leaking credentials or
//! stack traces to HTTP clients.

use thiserror::Error;

/// Result type alias using the core error type.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised while bootstrapping configuration and logging.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The tracing subscriber could not be installed.
    #[error("logging initialization failed: {0}")]
    Logging(String),

    /// Internal error.
    #[error("internal error")]
    Internal,
}

impl CoreError {
    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Logging(_) | Self::Internal)
    }
}
