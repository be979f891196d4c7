//! Browser SSO: the IDP answers `AuthnRequest`s with assertions, the SP
//! asks for them and turns the answer into a principal.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pl_core::{AuditEvent, AuditEventType};
use pl_session::keys;

use crate::error::{SamlError, SamlResult};
use crate::parser;
use crate::types::{
    Assertion, AssertionKind, Attribute, AttributeStatement, AuthnRequest, AuthnStatement,
    Conditions, EncryptedAssertion, NameId, NameIdFormat, RequestMessage, Response, SamlMessage,
    StatusResponseMessage, Subject, SubjectConfirmationData, AUTHN_CONTEXT_PASSWORD, ROLE_ATTRIBUTE_NAME,
};

use super::{
    params, ChainConfig, ExchangeOptions, GenerateRequestType, HandlerConfig, HandlerRole,
    ProviderConfig, RoleValidator, SamlHandler, SamlHandlerRequest, SamlHandlerResponse,
};

/// Message returned to the SP user agent when role validation fails.
const FORBIDDEN_PRINCIPAL: &str = "User Principal not determined: Forbidden";

/// Issues (IDP) and consumes (SP) authentication assertions.
pub struct AuthenticationHandler {
    config: Arc<ChainConfig>,
    params: HandlerConfig,
    clock_skew: Duration,
    role_keys: Vec<String>,
}

impl AuthenticationHandler {
    /// Creates the handler. A non-numeric clock skew is a configuration error.
    pub fn new(config: Arc<ChainConfig>, params: HandlerConfig) -> SamlResult<Self> {
        let clock_skew = match params.parameter(params::CLOCK_SKEW_MILIS) {
            Some(value) => value.trim().parse::<i64>().map(Duration::milliseconds).map_err(|_| {
                SamlError::Configuration(format!(
                    "{} must be a number of milliseconds, got '{value}'",
                    params::CLOCK_SKEW_MILIS
                ))
            })?,
            None => Duration::zero(),
        };
        let role_keys = params.list(params::ROLE_KEY);

        Ok(Self {
            config,
            params,
            clock_skew,
            role_keys,
        })
    }

    fn idp_response(
        &self,
        authn: &AuthnRequest,
        request: &SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<String> {
        let destination = authn.assertion_consumer_service_url.clone().ok_or_else(|| {
            SamlError::MissingElement("AuthnRequest/@AssertionConsumerServiceURL".to_string())
        })?;
        let session = &request.session;
        let principal = session
            .string_attribute(keys::PRINCIPAL_ID)
            .or_else(|| request.user_principal.clone())
            .ok_or_else(|| SamlError::processing("No principal bound to the session"))?;
        let roles: Vec<String> = session.attribute(keys::ROLES)?.unwrap_or_default();

        let mut assertion = self.assertion_for(request)?;
        let now = Utc::now();
        let validity = request.options.assertion_validity;
        assertion.subject = Some(
            Subject::new(NameId::with_format(&principal, NameIdFormat::Persistent)).with_bearer(
                SubjectConfirmationData {
                    in_response_to: Some(authn.id.clone()),
                    recipient: Some(destination.clone()),
                    not_on_or_after: Some(now + validity),
                },
            ),
        );
        let mut conditions = Conditions::window(now, validity);
        conditions.audiences.push(authn.issuer.clone());
        assertion.conditions = Some(conditions);

        if !self.params.flag(params::DISABLE_AUTHN_STATEMENT) {
            assertion.authn_statement = Some(AuthnStatement {
                authn_instant: now,
                session_index: Some(assertion.id.clone()),
                context_class_ref: request
                    .options
                    .login_type
                    .clone()
                    .unwrap_or_else(|| AUTHN_CONTEXT_PASSWORD.to_string()),
            });
        }
        if !self.params.flag(params::DISABLE_SENDING_ROLES) && !roles.is_empty() {
            assertion.attribute_statements.push(AttributeStatement {
                attributes: vec![Attribute::new(ROLE_ATTRIBUTE_NAME, roles)],
            });
        }
        if let Some(attributes) = request.options.attributes.as_ref().filter(|a| !a.is_empty()) {
            let mut attributes: Vec<Attribute> = attributes
                .iter()
                .map(|(name, values)| Attribute::new(name, values.clone()))
                .collect();
            attributes.sort_by(|a, b| a.name.cmp(&b.name));
            assertion
                .attribute_statements
                .push(AttributeStatement { attributes });
        }
        session.set_attribute(keys::ASSERTION, &assertion)?;

        let is_post = request.binding.is_post();
        self.config
            .require_identity_server()?
            .register(session.id(), &destination, is_post);

        let reply = Response::success(&request.issuer)
            .in_response_to(&authn.id)
            .with_destination(&destination)
            .with_assertion(assertion);
        response.set_message(&SamlMessage::Response(reply))?;
        response.destination = Some(destination.clone());
        response.relay_state = request.relay_state.clone();
        response.post_binding = is_post;
        response.send_request = false;

        self.config.audit(
            &AuditEvent::builder(AuditEventType::ResponseToSp)
                .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                .subject(&principal)
                .destination(&destination)
                .session(session.id())
                .build(),
        );
        Ok(principal)
    }

    /// Renews the session's assertion when one was issued before, otherwise
    /// starts a fresh one.
    fn assertion_for(&self, request: &SamlHandlerRequest) -> SamlResult<Assertion> {
        let session = &request.session;
        if session.contains_attribute(keys::ASSERTION_ID) {
            if let Some(mut cached) = session.attribute::<Assertion>(keys::ASSERTION)? {
                tracing::debug!(assertion_id = %cached.id, "renewing assertion");
                cached.issue_instant = Utc::now();
                cached.authn_statement = None;
                cached.attribute_statements.clear();
                return Ok(cached);
            }
        }
        Ok(Assertion::new(&request.issuer))
    }

    fn sp_authn_request(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let ProviderConfig::Sp(sp) = &self.config.provider else {
            return Ok(());
        };
        let acs_url = self
            .params
            .parameter(params::ASSERTION_CONSUMER_URL)
            .unwrap_or(&request.issuer)
            .to_string();
        let destination = response
            .destination
            .clone()
            .unwrap_or_else(|| sp.identity_url.clone());

        let binding = if response.post_binding {
            crate::types::SamlBinding::HttpPost
        } else {
            crate::types::SamlBinding::HttpRedirect
        };
        let mut authn = AuthnRequest::new(crate::types::generate_id(), &request.issuer)
            .with_destination(&destination)
            .with_acs_url(acs_url);
        authn.protocol_binding = Some(binding.uri().to_string());
        if let Some(format) = self.params.parameter(params::NAMEID_FORMAT) {
            authn = authn.with_name_id_format(format);
        }

        tracing::debug!(request_id = %authn.id, %destination, "generated AuthnRequest");
        request.options.auth_request_id = Some(authn.id.clone());
        response.set_message(&SamlMessage::AuthnRequest(authn))?;
        response.destination = Some(destination);
        response.relay_state = response.relay_state.take().or_else(|| request.relay_state.clone());
        response.send_request = true;
        Ok(())
    }

    fn sp_response(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let Some(StatusResponseMessage::Response(saml_response)) =
            request.message.as_ref().and_then(SamlMessage::as_status_response)
        else {
            return Ok(());
        };

        if !saml_response.status.is_success() {
            return Err(SamlError::processing("IDP forbid the user"));
        }
        let assertion = match saml_response.assertions.as_slice() {
            [] => return Err(SamlError::processing("No assertions in reply from IDP")),
            [AssertionKind::Plain(assertion)] => assertion.clone(),
            [AssertionKind::Encrypted(encrypted)] => self.decrypt(encrypted, &request.options)?,
            several => {
                return Err(SamlError::processing(format!(
                    "Expected one assertion in reply from IDP, got {}",
                    several.len()
                )))
            }
        };
        request.options.assertion = Some(assertion.clone());

        if assertion.has_expired(Utc::now(), self.clock_skew) {
            return Err(SamlError::processing_caused_by(
                "Assertion has expired",
                SamlError::AssertionExpired,
            ));
        }
        let principal = assertion
            .subject_name()
            .ok_or_else(|| SamlError::processing("Unable to find username via subject"))?
            .to_string();
        let roles = self.roles(&assertion);
        response.roles.clone_from(&roles);

        if !self.config.ignore_role_validator {
            let validator: &dyn RoleValidator =
                self.config.role_validator.as_deref().ok_or_else(|| {
                    SamlError::Configuration(format!("{} not provided", params::ROLE_VALIDATOR))
                })?;
            if !validator.user_in_role(&principal, &roles) {
                tracing::warn!(%principal, ?roles, "role validation failed");
                response.set_error(403, FORBIDDEN_PRINCIPAL);
                return Ok(());
            }
        }

        let session = &request.session;
        session.set_attribute(keys::PRINCIPAL_ID, &principal)?;
        session.set_attribute(keys::ROLES, &roles)?;
        session.set_attribute(keys::ASSERTION, &assertion)?;

        self.config.audit(
            &AuditEvent::builder(AuditEventType::RequestFromIdp)
                .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                .subject(&principal)
                .destination(&saml_response.issuer)
                .session(session.id())
                .build(),
        );
        tracing::debug!(%principal, roles = roles.len(), "principal established from assertion");
        Ok(())
    }

    fn decrypt(
        &self,
        encrypted: &EncryptedAssertion,
        options: &ExchangeOptions,
    ) -> SamlResult<Assertion> {
        let key = options.decrypting_key.as_deref().ok_or_else(|| {
            SamlError::processing("Encrypted assertion received without a decrypting key")
        })?;
        let decrypter = self.config.assertion_decrypter.as_ref().ok_or_else(|| {
            SamlError::Configuration("Assertion decrypter not configured".to_string())
        })?;
        let xml = decrypter
            .decrypt(encrypted, key)
            .map_err(|e| SamlError::processing_caused_by("Unable to decrypt assertion", e))?;
        parser::parse_assertion(&xml)
    }

    /// Values of the role attributes: every attribute, or only those named
    /// by `ROLE_KEY` when it is set. Nothing when role picking is disabled.
    fn roles(&self, assertion: &Assertion) -> Vec<String> {
        if self.params.flag(params::DISABLE_ROLE_PICKING) {
            return Vec::new();
        }
        assertion
            .attributes()
            .filter(|attr| self.role_keys.is_empty() || self.role_keys.contains(&attr.name))
            .flat_map(|attr| attr.values.iter().cloned())
            .collect()
    }
}

pub(super) fn who_is_auditing(options: &ExchangeOptions, issuer: &str) -> String {
    options
        .context_path
        .clone()
        .unwrap_or_else(|| issuer.to_string())
}

#[async_trait]
impl SamlHandler for AuthenticationHandler {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn generate_saml_request(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if self.config.role() != HandlerRole::Sp
            || request.request_type != Some(GenerateRequestType::Authentication)
        {
            return Ok(());
        }
        self.sp_authn_request(request, response)
    }

    async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if self.config.role() != HandlerRole::Idp {
            return Ok(());
        }
        let Some(RequestMessage::AuthnRequest(authn)) =
            request.message.as_ref().and_then(SamlMessage::as_request)
        else {
            return Ok(());
        };

        match self.idp_response(authn, request, response) {
            Ok(principal) => {
                tracing::debug!(%principal, sp = %authn.issuer, "assertion issued");
                Ok(())
            }
            Err(err) => {
                self.config.audit(
                    &AuditEvent::builder(AuditEventType::ErrorResponseToSp)
                        .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                        .destination(&authn.issuer)
                        .session(request.session.id())
                        .failure(err.to_string())
                        .build(),
                );
                Err(SamlError::processing_caused_by("authentication issue", err))
            }
        }
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if self.config.role() != HandlerRole::Sp {
            return Ok(());
        }
        self.sp_response(request, response)
    }
}
