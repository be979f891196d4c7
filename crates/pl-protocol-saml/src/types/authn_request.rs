//! Authentication requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SAML `AuthnRequest`, sent by a service provider to ask the IDP to
/// authenticate the browser's user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// Entity ID of the requesting service provider.
    pub issuer: String,

    /// Endpoint the request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Where the IDP must deliver its response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Binding requested for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<String>,

    /// Requested `NameID` format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy_format: Option<String>,

    /// Whether the IDP must re-authenticate the user.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IDP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,
}

impl AuthnRequest {
    /// Creates a request with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_policy_format: None,
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the destination.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the requested `NameID` format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: impl Into<String>) -> Self {
        self.name_id_policy_format = Some(format.into());
        self
    }
}
