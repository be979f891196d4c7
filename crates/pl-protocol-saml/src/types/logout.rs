//! Single logout messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, Status};

/// SAML `LogoutRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the sender.
    pub issuer: String,

    /// Endpoint the request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The principal being logged out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Time after which the request must be discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Session indexes to terminate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_indexes: Vec<String>,

    /// Reason URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LogoutRequest {
    /// Creates a logout request with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            name_id: None,
            not_on_or_after: None,
            session_indexes: Vec::new(),
            reason: None,
        }
    }

    /// Sets the principal.
    #[must_use]
    pub fn with_name_id(mut self, name_id: NameId) -> Self {
        self.name_id = Some(name_id);
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }
}

/// SAML `LogoutResponse`, a plain status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Request this response answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the sender.
    pub issuer: String,

    /// Endpoint the response is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Outcome.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a response carrying the two-level logout success status.
    #[must_use]
    pub fn success(issuer: impl Into<String>) -> Self {
        Self {
            id: super::generate_id(),
            in_response_to: None,
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            status: Status::logout_success(),
        }
    }

    /// Sets the request this response answers.
    #[must_use]
    pub fn in_response_to(mut self, request_id: Option<String>) -> Self {
        self.in_response_to = request_id;
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }
}
