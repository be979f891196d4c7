//! SAML 2.0 bindings.
//!
//! - **HTTP-POST**: the message is base64-encoded into an auto-submitting
//!   HTML form.
//! - **HTTP-Redirect**: the message is deflated, base64-encoded and carried
//!   in the query string; signatures, when present, cover the query string
//!   rather than the XML.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use crate::types::SamlBinding;

/// Whether a binding payload carries a request or a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// `SAMLRequest` parameter.
    Request,
    /// `SAMLResponse` parameter.
    Response,
}

impl SamlMessageType {
    /// Returns the form or query parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// A SAML message lifted off the wire.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// Request or response.
    pub message_type: SamlMessageType,
    /// Binding the message arrived over.
    pub binding: SamlBinding,
    /// The `RelayState`, if present.
    pub relay_state: Option<String>,
    /// Detached redirect-binding signature, when the query was signed.
    pub redirect_signature: Option<RedirectSignature>,
}

/// The parts of a signed HTTP-Redirect query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// The exact octets that were signed:
    /// `SAMLRequest=..&RelayState=..&SigAlg=..`.
    pub signed_query: String,
    /// Base64 signature value.
    pub signature: String,
    /// Signature algorithm URI.
    pub sig_alg: String,
}
