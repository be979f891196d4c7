//! Signs outbound documents and checks inbound ones.

use std::sync::Arc;

use async_trait::async_trait;
use pl_core::{AuditEvent, AuditEventType};

use crate::bindings::{HttpRedirectBinding, SamlMessageType};
use crate::error::{SamlError, SamlResult};
use crate::signature::{XmlSignatureValidator, XmlSigner};
use crate::types::{AssertionKind, SamlMessage, StatusResponseMessage};

use super::authentication::who_is_auditing;
use super::{
    params, ChainConfig, HandlerConfig, SamlHandler, SamlHandlerRequest, SamlHandlerResponse,
};

/// Signs whatever document the earlier handlers produced.
///
/// POST messages get an enveloped signature over the root element (and,
/// when configured, over the first assertion of a `Response`). Redirect
/// messages get the detached query-string signature instead.
pub struct SignatureGenerationHandler {
    config: Arc<ChainConfig>,
    sign_assertion: bool,
    sign_root: bool,
}

impl SignatureGenerationHandler {
    /// Creates the handler.
    pub fn new(config: Arc<ChainConfig>, params: HandlerConfig) -> SamlResult<Self> {
        let assertion_only = params.flag(params::SIGN_ASSERTION_ONLY);
        Ok(Self {
            config,
            sign_assertion: assertion_only || params.flag(params::SIGN_RESPONSE_AND_ASSERTION),
            sign_root: !assertion_only,
        })
    }

    fn sign(&self, response: &mut SamlHandlerResponse) -> SamlResult<()> {
        if !self.config.supports_signatures || response.error.is_some() {
            return Ok(());
        }
        let Some(message) = response.message()? else {
            return Ok(());
        };
        let key_pair = self.config.keypair.clone().ok_or_else(|| {
            SamlError::Configuration(format!("{} is required to sign messages", params::KEYPAIR))
        })?;
        let signer = XmlSigner::new(key_pair);

        if !response.post_binding {
            let message_type = if response.send_request {
                SamlMessageType::Request
            } else {
                SamlMessageType::Response
            };
            let Some(document) = &response.document else {
                return Ok(());
            };
            let query = HttpRedirectBinding::encode_query(
                document,
                response.relay_state.as_deref(),
                message_type,
            )?;
            response.destination_query_string = Some(signer.sign_redirect_query(&query)?);
            tracing::debug!(message = message.element_name(), "signed redirect query");
            return Ok(());
        }

        let mut document = response.document.take().unwrap_or_default();
        if self.sign_assertion {
            if let SamlMessage::Response(reply) = &message {
                if let Some(assertion) = reply.first_assertion() {
                    document = signer.sign(&document, &assertion.id)?;
                }
            }
        }
        if self.sign_root {
            document = signer.sign(&document, message.id())?;
        }
        response.document = Some(document);
        tracing::debug!(message = message.element_name(), id = message.id(), "signed document");
        Ok(())
    }
}

#[async_trait]
impl SamlHandler for SignatureGenerationHandler {
    fn name(&self) -> &'static str {
        "signature-generation"
    }

    async fn generate_saml_request(
        &self,
        _request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.sign(response)
    }

    async fn handle_request_type(
        &self,
        _request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.sign(response)
    }

    async fn handle_status_response_type(
        &self,
        _request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.sign(response)
    }
}

/// Verifies the signature of every inbound message.
pub struct SignatureValidationHandler {
    config: Arc<ChainConfig>,
    ignore_signatures: bool,
}

impl SignatureValidationHandler {
    /// Creates the handler.
    pub fn new(config: Arc<ChainConfig>, params: HandlerConfig) -> SamlResult<Self> {
        Ok(Self {
            config,
            ignore_signatures: params.flag(params::IGNORE_SIGNATURES),
        })
    }

    fn validate(&self, request: &SamlHandlerRequest) -> SamlResult<()> {
        if self.ignore_signatures || request.options.ignore_signatures {
            tracing::debug!("signature validation skipped");
            return Ok(());
        }

        let mut trusted = self.config.trusted_certificates.clone();
        trusted.extend(request.options.sender_certificate.iter().cloned());
        let validator = XmlSignatureValidator::new(trusted);

        let outcome = match (&request.redirect_signature, &request.document) {
            (Some(redirect), _) => validator.validate_redirect(redirect),
            (None, Some(document)) => validator.validate(document).and_then(|signature| {
                let message = request.message.as_ref().ok_or_else(|| {
                    SamlError::SignatureValidation("no message to bind the signature to".to_string())
                })?;
                check_signed_element(message, signature.reference_uri.trim_start_matches('#'))
            }),
            (None, None) => Err(SamlError::SignatureValidation(
                "no document to validate".to_string(),
            )),
        };

        outcome.map_err(|err| {
            tracing::warn!(
                error = %err,
                issuer = ?request.message.as_ref().map(SamlMessage::issuer),
                "signature validation failed"
            );
            self.config.audit(
                &AuditEvent::builder(AuditEventType::ErrorSignatureValidation)
                    .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                    .session(request.session.id())
                    .failure(err.to_string())
                    .build(),
            );
            let cause = match err {
                SamlError::SignatureValidation(reason) => SamlError::SignatureValidation(reason),
                other => SamlError::SignatureValidation(other.to_string()),
            };
            SamlError::processing_caused_by("Signature Validation Failed", cause)
        })
    }
}

/// The signed element must be the message root or the single assertion of
/// a `Response`, since those are what the later handlers read.
fn check_signed_element(message: &SamlMessage, signed_id: &str) -> SamlResult<()> {
    if let Some(StatusResponseMessage::Response(reply)) = message.as_status_response() {
        if reply.assertions.len() > 1 {
            return Err(SamlError::SignatureValidation(format!(
                "Response carries {} assertions",
                reply.assertions.len()
            )));
        }
        if let Some(AssertionKind::Plain(assertion)) = reply.assertions.first() {
            if assertion.id == signed_id {
                return Ok(());
            }
        }
    }

    if message.id() == signed_id {
        Ok(())
    } else {
        Err(SamlError::SignatureValidation(format!(
            "signed element '{signed_id}' is not the {} being processed",
            message.element_name()
        )))
    }
}

#[async_trait]
impl SamlHandler for SignatureValidationHandler {
    fn name(&self) -> &'static str {
        "signature-validation"
    }

    async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.validate(request)
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.validate(request)
    }
}
