//! SAML status.

use serde::{Deserialize, Serialize};

use super::status_codes;

/// Status carried by every status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code, possibly with a nested second-level code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a plain success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Creates the two-level status used by logout responses: top-level
    /// `Responder` wrapping a nested `Success`.
    #[must_use]
    pub fn logout_success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::RESPONDER)
                .with_nested(StatusCode::new(status_codes::SUCCESS)),
            status_message: None,
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::new(status_codes::RESPONDER),
            status_message: Some(message.into()),
        }
    }

    /// Returns true if the top-level code is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Returns the nested second-level code value, if any.
    #[must_use]
    pub fn second_level_value(&self) -> Option<&str> {
        self.status_code.nested.as_deref().map(|code| code.value.as_str())
    }
}

/// A status code URI with an optional nested code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI.
    pub value: String,

    /// Nested status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a status code without a nested code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            nested: None,
        }
    }

    /// Nests a second-level code.
    #[must_use]
    pub fn with_nested(mut self, nested: StatusCode) -> Self {
        self.nested = Some(Box::new(nested));
        self
    }
}
