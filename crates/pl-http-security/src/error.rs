//! Security filter errors.
//!
//! Every error is turned into an HTTP status at the filter's outbound
//! boundary; clients only ever see the message text.

use axum::http::StatusCode;
use thiserror::Error;

/// Message sent when an error carries nothing safe to show.
pub const GENERIC_ERROR_MESSAGE: &str = "The server could not process your request.";

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Security filter errors.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The path requires an authenticated user and no scheme can challenge.
    #[error("{0}")]
    AuthenticationRequired(String),

    /// The authenticated user may not access the path.
    #[error("{0}")]
    AccessDenied(String),

    /// The request method is not allowed for the path.
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Credentials could not be validated.
    #[error("{0}")]
    Authentication(String),

    /// The filter was configured inconsistently.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SecurityError {
    /// Returns the HTTP status sent for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Authentication(_) | Self::Configuration(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the message safe to send to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Configuration(_) | Self::Internal(_) => GENERIC_ERROR_MESSAGE.to_string(),
            other => {
                let message = other.to_string();
                if message.is_empty() {
                    GENERIC_ERROR_MESSAGE.to_string()
                } else {
                    message
                }
            }
        }
    }
}

impl From<pl_session::SessionError> for SecurityError {
    fn from(err: pl_session::SessionError) -> Self {
        Self::Internal(err.to_string())
    }
}
