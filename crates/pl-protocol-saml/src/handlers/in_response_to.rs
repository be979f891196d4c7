//! Ties each SP `Response` to the `AuthnRequest` that asked for it.

use std::sync::Arc;

use async_trait::async_trait;
use pl_session::keys;

use crate::error::{SamlError, SamlResult};
use crate::types::{SamlMessage, StatusResponseMessage};

use super::{
    ChainConfig, GenerateRequestType, HandlerConfig, HandlerRole, SamlHandler,
    SamlHandlerRequest, SamlHandlerResponse,
};

/// Remembers the outstanding request ID in the session and rejects
/// responses that do not answer it. SP only.
pub struct InResponseToVerificationHandler {
    config: Arc<ChainConfig>,
}

impl InResponseToVerificationHandler {
    /// Creates the handler.
    pub fn new(config: Arc<ChainConfig>, _params: HandlerConfig) -> SamlResult<Self> {
        Ok(Self { config })
    }

    fn is_sp(&self) -> bool {
        self.config.role() == HandlerRole::Sp
    }
}

#[async_trait]
impl SamlHandler for InResponseToVerificationHandler {
    fn name(&self) -> &'static str {
        "in-response-to"
    }

    async fn generate_saml_request(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if !self.is_sp() || request.request_type != Some(GenerateRequestType::Authentication) {
            return Ok(());
        }
        let Some(id) = &request.options.auth_request_id else {
            return Err(SamlError::processing(
                "AuthnRequest ID missing, the authentication handler must run first",
            ));
        };
        request.session.set_attribute(keys::AUTH_REQUEST_ID, id)?;
        tracing::debug!(%id, "stored outstanding AuthnRequest ID");
        Ok(())
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if !self.is_sp() {
            return Ok(());
        }
        let Some(reply @ StatusResponseMessage::Response(_)) =
            request.message.as_ref().and_then(SamlMessage::as_status_response)
        else {
            return Ok(());
        };

        let expected: Option<String> = request.session.take_attribute(keys::AUTH_REQUEST_ID)?;
        let actual = reply.in_response_to().map(str::to_string);

        match (&expected, &actual) {
            (Some(expected), Some(actual)) if expected == actual => {
                tracing::debug!(%actual, "InResponseTo verified");
                Ok(())
            }
            _ => {
                tracing::warn!(?expected, ?actual, "InResponseTo verification failed");
                Err(SamlError::processing_caused_by(
                    "Verification of InResponseTo failed",
                    SamlError::InResponseToMismatch { expected, actual },
                ))
            }
        }
    }
}
