//! Authentication responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Assertion, Status};

/// SAML `Response`, the IDP's answer to an `AuthnRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Request this response answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the issuing IDP.
    pub issuer: String,

    /// Endpoint the response is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Outcome.
    pub status: Status,

    /// Plain or encrypted assertions, in document order.
    #[serde(default)]
    pub assertions: Vec<AssertionKind>,
}

impl Response {
    /// Creates a success response with a fresh ID and no assertions.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            in_response_to: None,
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            status: Status::success(),
            assertions: Vec::new(),
        }
    }

    /// Sets the request this response answers.
    #[must_use]
    pub fn in_response_to(mut self, request_id: impl Into<String>) -> Self {
        self.in_response_to = Some(request_id.into());
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Appends a plain assertion.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(AssertionKind::Plain(assertion));
        self
    }

    /// Returns the first plain assertion.
    #[must_use]
    pub fn first_assertion(&self) -> Option<&Assertion> {
        self.assertions.iter().find_map(|kind| match kind {
            AssertionKind::Plain(assertion) => Some(assertion),
            AssertionKind::Encrypted(_) => None,
        })
    }
}

/// An assertion as it appears inside a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssertionKind {
    /// A cleartext assertion.
    Plain(Assertion),
    /// An XML-encrypted assertion.
    Encrypted(EncryptedAssertion),
}

/// An `EncryptedAssertion` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedAssertion {
    /// Data encryption algorithm URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// Wrapped content-encryption key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<EncryptedKey>,

    /// Base64 cipher value of the assertion.
    pub cipher_value: String,
}

/// Wrapped content-encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// Key transport algorithm URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_method: Option<String>,

    /// Base64 cipher value of the key.
    pub cipher_value: String,
}
