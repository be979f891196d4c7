//! The SAML messages a handler chain can receive.
//!
//! Handlers are invoked through one of two entry points, one for requests and
//! one for status responses. [`SamlMessage::as_request`] and
//! [`SamlMessage::as_status_response`] give them a typed view of whichever
//! kind they were handed.

use super::{AuthnRequest, LogoutRequest, LogoutResponse, Response};

/// A parsed SAML protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum SamlMessage {
    /// Authentication request.
    AuthnRequest(AuthnRequest),
    /// Logout request.
    LogoutRequest(LogoutRequest),
    /// Authentication response.
    Response(Response),
    /// Logout response.
    LogoutResponse(LogoutResponse),
}

/// Borrowed view of a request message.
#[derive(Debug, Clone, Copy)]
pub enum RequestMessage<'a> {
    /// Authentication request.
    AuthnRequest(&'a AuthnRequest),
    /// Logout request.
    LogoutRequest(&'a LogoutRequest),
}

/// Borrowed view of a status response message.
#[derive(Debug, Clone, Copy)]
pub enum StatusResponseMessage<'a> {
    /// Authentication response.
    Response(&'a Response),
    /// Logout response.
    LogoutResponse(&'a LogoutResponse),
}

impl SamlMessage {
    /// Returns the message ID.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::AuthnRequest(m) => &m.id,
            Self::LogoutRequest(m) => &m.id,
            Self::Response(m) => &m.id,
            Self::LogoutResponse(m) => &m.id,
        }
    }

    /// Returns the issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &str {
        match self {
            Self::AuthnRequest(m) => &m.issuer,
            Self::LogoutRequest(m) => &m.issuer,
            Self::Response(m) => &m.issuer,
            Self::LogoutResponse(m) => &m.issuer,
        }
    }

    /// Returns the destination, when stated.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::AuthnRequest(m) => m.destination.as_deref(),
            Self::LogoutRequest(m) => m.destination.as_deref(),
            Self::Response(m) => m.destination.as_deref(),
            Self::LogoutResponse(m) => m.destination.as_deref(),
        }
    }

    /// Returns the XML local name of the root element.
    #[must_use]
    pub const fn element_name(&self) -> &'static str {
        match self {
            Self::AuthnRequest(_) => "AuthnRequest",
            Self::LogoutRequest(_) => "LogoutRequest",
            Self::Response(_) => "Response",
            Self::LogoutResponse(_) => "LogoutResponse",
        }
    }

    /// Returns a request view, or `None` for status responses.
    #[must_use]
    pub fn as_request(&self) -> Option<RequestMessage<'_>> {
        match self {
            Self::AuthnRequest(m) => Some(RequestMessage::AuthnRequest(m)),
            Self::LogoutRequest(m) => Some(RequestMessage::LogoutRequest(m)),
            Self::Response(_) | Self::LogoutResponse(_) => None,
        }
    }

    /// Returns a status response view, or `None` for requests.
    #[must_use]
    pub fn as_status_response(&self) -> Option<StatusResponseMessage<'_>> {
        match self {
            Self::Response(m) => Some(StatusResponseMessage::Response(m)),
            Self::LogoutResponse(m) => Some(StatusResponseMessage::LogoutResponse(m)),
            Self::AuthnRequest(_) | Self::LogoutRequest(_) => None,
        }
    }

    /// Returns true for `AuthnRequest` and `LogoutRequest`.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.as_request().is_some()
    }
}

impl<'a> RequestMessage<'a> {
    /// Returns the issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &'a str {
        match *self {
            Self::AuthnRequest(m) => &m.issuer,
            Self::LogoutRequest(m) => &m.issuer,
        }
    }
}

impl<'a> StatusResponseMessage<'a> {
    /// Returns the issuer entity ID.
    #[must_use]
    pub fn issuer(&self) -> &'a str {
        match *self {
            Self::Response(m) => &m.issuer,
            Self::LogoutResponse(m) => &m.issuer,
        }
    }

    /// Returns the `InResponseTo` value.
    #[must_use]
    pub fn in_response_to(&self) -> Option<&'a str> {
        match *self {
            Self::Response(m) => m.in_response_to.as_deref(),
            Self::LogoutResponse(m) => m.in_response_to.as_deref(),
        }
    }
}
