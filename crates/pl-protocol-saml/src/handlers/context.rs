//! Per-exchange state threaded through the handler chain.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use pl_session::HttpSession;

use crate::bindings::{
    DecodedMessage, HttpPostBinding, HttpRedirectBinding, RedirectSignature, SamlMessageType,
};
use crate::error::SamlResult;
use crate::parser;
use crate::types::{Assertion, SamlBinding, SamlMessage};
use crate::writer;

/// Kind of message the local party initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateRequestType {
    /// An `AuthnRequest` (SP).
    Authentication,
    /// A `LogoutRequest`.
    Logout,
}

/// Values handlers hand to each other within one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Assertion received (SP) by the authentication handler.
    pub assertion: Option<Assertion>,
    /// ID of the `AuthnRequest` being generated (SP).
    pub auth_request_id: Option<String>,
    /// Attributes to release in the assertion (IDP).
    pub attributes: Option<HashMap<String, Vec<String>>>,
    /// Authentication context class of the login (IDP).
    pub login_type: Option<String>,
    /// Private key (PKCS#8 DER) for encrypted assertions (SP).
    pub decrypting_key: Option<Vec<u8>>,
    /// Skip signature validation for this exchange.
    pub ignore_signatures: bool,
    /// Validity window of issued assertions (IDP).
    pub assertion_validity: Duration,
    /// Context path of the application, recorded in audit events.
    pub context_path: Option<String>,
    /// Certificate (DER) of the peer, trusted for this exchange.
    pub sender_certificate: Option<Vec<u8>>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            assertion: None,
            auth_request_id: None,
            attributes: None,
            login_type: None,
            decrypting_key: None,
            ignore_signatures: false,
            assertion_validity: Duration::minutes(5),
            context_path: None,
            sender_certificate: None,
        }
    }
}

/// What a handler chain is asked to process.
#[derive(Debug, Clone)]
pub struct SamlHandlerRequest {
    /// The HTTP session of the user agent.
    pub session: Arc<HttpSession>,
    /// The inbound message, `None` when generating a request.
    pub message: Option<SamlMessage>,
    /// The inbound message as received, for signature validation.
    pub document: Option<String>,
    /// Entity ID of the local party.
    pub issuer: String,
    /// Inbound `RelayState`.
    pub relay_state: Option<String>,
    /// Binding the inbound message arrived over.
    pub binding: SamlBinding,
    /// Detached signature of an inbound redirect.
    pub redirect_signature: Option<RedirectSignature>,
    /// Kind of request to generate.
    pub request_type: Option<GenerateRequestType>,
    /// Principal authenticated by the container, if any.
    pub user_principal: Option<String>,
    /// Exchange options.
    pub options: ExchangeOptions,
}

impl SamlHandlerRequest {
    /// Wraps a decoded inbound message.
    pub fn inbound(
        session: Arc<HttpSession>,
        issuer: impl Into<String>,
        decoded: DecodedMessage,
    ) -> SamlResult<Self> {
        let message = parser::parse(&decoded.xml)?;
        Ok(Self {
            session,
            message: Some(message),
            document: Some(decoded.xml),
            issuer: issuer.into(),
            relay_state: decoded.relay_state,
            binding: decoded.binding,
            redirect_signature: decoded.redirect_signature,
            request_type: None,
            user_principal: None,
            options: ExchangeOptions::default(),
        })
    }

    /// Prepares the generation of a request by the local party.
    #[must_use]
    pub fn generate(
        session: Arc<HttpSession>,
        issuer: impl Into<String>,
        request_type: GenerateRequestType,
    ) -> Self {
        Self {
            session,
            message: None,
            document: None,
            issuer: issuer.into(),
            relay_state: None,
            binding: SamlBinding::HttpPost,
            redirect_signature: None,
            request_type: Some(request_type),
            user_principal: None,
            options: ExchangeOptions::default(),
        }
    }

    /// Sets the container principal.
    #[must_use]
    pub fn with_user_principal(mut self, principal: impl Into<String>) -> Self {
        self.user_principal = Some(principal.into());
        self
    }

    /// Sets the exchange options.
    #[must_use]
    pub fn with_options(mut self, options: ExchangeOptions) -> Self {
        self.options = options;
        self
    }
}

/// An error a handler reports to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    /// HTTP status code.
    pub code: u16,
    /// Message for the client.
    pub message: String,
}

/// A message ready to be sent to the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Auto-submitting HTML form.
    Post(String),
    /// Redirect location.
    Redirect(String),
}

/// What the handler chain produced.
#[derive(Debug, Clone)]
pub struct SamlHandlerResponse {
    /// Outbound message XML.
    pub document: Option<String>,
    /// Where the outbound message goes.
    pub destination: Option<String>,
    /// Outbound `RelayState`.
    pub relay_state: Option<String>,
    /// Roles of the principal authenticated by this exchange (SP).
    pub roles: Vec<String>,
    /// Error to report instead of a message.
    pub error: Option<HandlerError>,
    /// Send over HTTP-POST rather than HTTP-Redirect.
    pub post_binding: bool,
    /// The outbound message is a request, not a response.
    pub send_request: bool,
    /// Signed redirect query, when the redirect binding is signed.
    pub destination_query_string: Option<String>,
}

impl Default for SamlHandlerResponse {
    fn default() -> Self {
        Self {
            document: None,
            destination: None,
            relay_state: None,
            roles: Vec::new(),
            error: None,
            post_binding: true,
            send_request: false,
            destination_query_string: None,
        }
    }
}

impl SamlHandlerResponse {
    /// Creates an empty response using the POST binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes `message` as the outbound document.
    pub fn set_message(&mut self, message: &SamlMessage) -> SamlResult<()> {
        self.document = Some(writer::to_xml(message)?);
        self.destination_query_string = None;
        Ok(())
    }

    /// Records an error for the HTTP layer.
    pub fn set_error(&mut self, code: u16, message: impl Into<String>) {
        self.error = Some(HandlerError {
            code,
            message: message.into(),
        });
    }

    /// Parses the outbound document back into a message.
    pub fn message(&self) -> SamlResult<Option<SamlMessage>> {
        self.document.as_deref().map(parser::parse).transpose()
    }

    /// Encodes the outbound document with the selected binding.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn outbound(&self) -> SamlResult<Option<Outbound>> {
        let (Some(document), Some(destination)) = (&self.document, &self.destination) else {
            return Ok(None);
        };
        let message_type = if self.send_request {
            SamlMessageType::Request
        } else {
            SamlMessageType::Response
        };

        if self.post_binding {
            return Ok(Some(Outbound::Post(HttpPostBinding::encode(
                document,
                destination,
                self.relay_state.as_deref(),
                message_type,
            ))));
        }

        let query = match &self.destination_query_string {
            Some(query) => query.clone(),
            None => HttpRedirectBinding::encode_query(
                document,
                self.relay_state.as_deref(),
                message_type,
            )?,
        };
        Ok(Some(Outbound::Redirect(HttpRedirectBinding::append_query(
            destination,
            &query,
        ))))
    }
}
