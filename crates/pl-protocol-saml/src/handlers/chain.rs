//! Chain-level configuration and the chain driver.

use std::collections::HashMap;
use std::sync::Arc;

use pl_core::config::SamlConfig;
use pl_core::{AuditEvent, AuditHelper};

use crate::error::{SamlError, SamlResult};
use crate::identity_server::IdentityParticipantStack;
use crate::signature::KeyPair;
use crate::sts::SecurityTokenService;

use super::{
    AssertionDecrypter, AttributeManager, RoleValidator, SamlHandler, SamlHandlerRequest,
    SamlHandlerResponse,
};

/// Side of the exchange a chain runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRole {
    /// Identity provider.
    Idp,
    /// Service provider.
    Sp,
}

/// Identity provider settings.
#[derive(Debug, Clone, Default)]
pub struct IdpConfig {
    /// Entity ID and SSO URL of the IDP.
    pub identity_url: String,
    /// Comma-separated hosts the IDP accepts messages from.
    pub trust_domains: Option<String>,
    /// Name of the default attribute manager registered on the chain.
    pub attribute_manager: Option<String>,
}

impl IdpConfig {
    /// Creates IDP settings.
    #[must_use]
    pub fn new(identity_url: impl Into<String>) -> Self {
        Self {
            identity_url: identity_url.into(),
            ..Self::default()
        }
    }

    /// Sets the trusted domains.
    #[must_use]
    pub fn with_trust_domains(mut self, domains: impl Into<String>) -> Self {
        self.trust_domains = Some(domains.into());
        self
    }

    /// Sets the default attribute manager.
    #[must_use]
    pub fn with_attribute_manager(mut self, name: impl Into<String>) -> Self {
        self.attribute_manager = Some(name.into());
        self
    }
}

/// Service provider settings.
#[derive(Debug, Clone, Default)]
pub struct SpConfig {
    /// Entity ID and URL of the SP.
    pub service_url: String,
    /// URL of the IDP requests are sent to.
    pub identity_url: String,
    /// Comma-separated hosts the SP accepts messages from.
    pub trust_domains: Option<String>,
}

impl SpConfig {
    /// Creates SP settings.
    #[must_use]
    pub fn new(service_url: impl Into<String>, identity_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            identity_url: identity_url.into(),
            trust_domains: None,
        }
    }

    /// Sets the trusted domains.
    #[must_use]
    pub fn with_trust_domains(mut self, domains: impl Into<String>) -> Self {
        self.trust_domains = Some(domains.into());
        self
    }
}

/// IDP or SP settings. The variant decides the chain's role.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// Identity provider.
    Idp(IdpConfig),
    /// Service provider.
    Sp(SpConfig),
}

impl ProviderConfig {
    /// Returns the role these settings configure.
    #[must_use]
    pub const fn role(&self) -> HandlerRole {
        match self {
            Self::Idp(_) => HandlerRole::Idp,
            Self::Sp(_) => HandlerRole::Sp,
        }
    }

    /// Returns the trusted domain list.
    #[must_use]
    pub fn trust_domains(&self) -> Option<&str> {
        match self {
            Self::Idp(idp) => idp.trust_domains.as_deref(),
            Self::Sp(sp) => sp.trust_domains.as_deref(),
        }
    }
}

/// Configuration shared by every handler of a chain.
///
/// Collaborators are optional; a handler that needs a missing one fails
/// when it is used.
#[derive(Clone)]
pub struct ChainConfig {
    /// IDP or SP settings.
    pub provider: ProviderConfig,
    /// Protocol timeouts and binding policy.
    pub saml: SamlConfig,
    /// Key pair for outbound signatures.
    pub keypair: Option<KeyPair>,
    /// Whether outbound messages are signed.
    pub supports_signatures: bool,
    /// DER certificates inbound signatures are checked against.
    pub trusted_certificates: Vec<Vec<u8>>,
    /// Validates the roles of a principal authenticated at the SP.
    pub role_validator: Option<Arc<dyn RoleValidator>>,
    /// Accept principals without role validation.
    pub ignore_role_validator: bool,
    /// Participant stack for single logout (IDP).
    pub identity_server: Option<Arc<dyn IdentityParticipantStack>>,
    /// Token service cancelled against on logout (IDP).
    pub sts: Option<Arc<dyn SecurityTokenService>>,
    /// Attribute managers by name (IDP).
    pub attribute_managers: HashMap<String, Arc<dyn AttributeManager>>,
    /// Decrypts encrypted assertions (SP).
    pub assertion_decrypter: Option<Arc<dyn AssertionDecrypter>>,
    /// Audit sink.
    pub audit: Option<AuditHelper>,
}

impl ChainConfig {
    /// Creates an IDP chain configuration.
    #[must_use]
    pub fn idp(config: IdpConfig) -> Self {
        Self::with_provider(ProviderConfig::Idp(config))
    }

    /// Creates an SP chain configuration.
    #[must_use]
    pub fn sp(config: SpConfig) -> Self {
        Self::with_provider(ProviderConfig::Sp(config))
    }

    fn with_provider(provider: ProviderConfig) -> Self {
        Self {
            provider,
            saml: SamlConfig::default(),
            keypair: None,
            supports_signatures: false,
            trusted_certificates: Vec::new(),
            role_validator: None,
            ignore_role_validator: false,
            identity_server: None,
            sts: None,
            attribute_managers: HashMap::new(),
            assertion_decrypter: None,
            audit: None,
        }
    }

    /// Sets the protocol settings.
    #[must_use]
    pub fn with_saml(mut self, saml: SamlConfig) -> Self {
        self.saml = saml;
        self
    }

    /// Enables signing with `keypair`.
    #[must_use]
    pub fn with_keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self.supports_signatures = true;
        self
    }

    /// Trusts a DER certificate for inbound signatures.
    #[must_use]
    pub fn with_trusted_certificate(mut self, certificate_der: Vec<u8>) -> Self {
        self.trusted_certificates.push(certificate_der);
        self
    }

    /// Sets the role validator.
    #[must_use]
    pub fn with_role_validator(mut self, validator: Arc<dyn RoleValidator>) -> Self {
        self.role_validator = Some(validator);
        self
    }

    /// Skips role validation.
    #[must_use]
    pub fn ignoring_role_validator(mut self) -> Self {
        self.ignore_role_validator = true;
        self
    }

    /// Sets the participant stack.
    #[must_use]
    pub fn with_identity_server(mut self, server: Arc<dyn IdentityParticipantStack>) -> Self {
        self.identity_server = Some(server);
        self
    }

    /// Sets the token service.
    #[must_use]
    pub fn with_sts(mut self, sts: Arc<dyn SecurityTokenService>) -> Self {
        self.sts = Some(sts);
        self
    }

    /// Registers an attribute manager under `name`.
    #[must_use]
    pub fn with_attribute_manager(
        mut self,
        name: impl Into<String>,
        manager: Arc<dyn AttributeManager>,
    ) -> Self {
        self.attribute_managers.insert(name.into(), manager);
        self
    }

    /// Sets the assertion decrypter.
    #[must_use]
    pub fn with_assertion_decrypter(mut self, decrypter: Arc<dyn AssertionDecrypter>) -> Self {
        self.assertion_decrypter = Some(decrypter);
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditHelper) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns the chain's role.
    #[must_use]
    pub const fn role(&self) -> HandlerRole {
        self.provider.role()
    }

    /// Returns the participant stack or a configuration error.
    pub(crate) fn require_identity_server(&self) -> SamlResult<&Arc<dyn IdentityParticipantStack>> {
        self.identity_server
            .as_ref()
            .ok_or_else(|| SamlError::Configuration("Identity server not configured".to_string()))
    }

    /// Records an audit event when auditing is on.
    pub(crate) fn audit(&self, event: &AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.audit(event);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Generate,
    Request,
    StatusResponse,
}

/// An ordered list of handlers run for every exchange.
pub struct SamlHandlerChain {
    config: Arc<ChainConfig>,
    handlers: Vec<Box<dyn SamlHandler>>,
}

impl SamlHandlerChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(config: Arc<ChainConfig>) -> Self {
        Self {
            config,
            handlers: Vec::new(),
        }
    }

    /// Appends a handler.
    #[must_use]
    pub fn with(mut self, handler: impl SamlHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Returns the chain configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<ChainConfig> {
        &self.config
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when the chain has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every handler's request generation.
    pub async fn generate_saml_request(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.run(Stage::Generate, request, response).await
    }

    /// Runs every handler on an inbound request.
    pub async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.run(Stage::Request, request, response).await
    }

    /// Runs every handler on an inbound status response.
    pub async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.run(Stage::StatusResponse, request, response).await
    }

    /// Dispatches on the inbound message: requests and status responses go
    /// to their entry point, no message means a request is generated.
    pub async fn process(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let stage = match &request.message {
            None => Stage::Generate,
            Some(message) if message.is_request() => Stage::Request,
            Some(_) => Stage::StatusResponse,
        };
        self.run(stage, request, response).await
    }

    /// Resets every handler.
    pub fn reset(&self) -> SamlResult<()> {
        self.handlers.iter().try_for_each(|handler| handler.reset())
    }

    /// Runs the handlers in order. The first error aborts the exchange and
    /// is reported on the response; a handler that records an error on the
    /// response also stops the chain.
    async fn run(
        &self,
        stage: Stage,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        for handler in &self.handlers {
            tracing::debug!(handler = handler.name(), ?stage, role = ?self.config.role(), "running handler");
            let result = match stage {
                Stage::Generate => handler.generate_saml_request(request, response).await,
                Stage::Request => handler.handle_request_type(request, response).await,
                Stage::StatusResponse => {
                    handler.handle_status_response_type(request, response).await
                }
            };

            if let Err(err) = result {
                tracing::warn!(handler = handler.name(), error = %err, "handler chain aborted");
                response.set_error(err.http_status(), err.to_string());
                return Err(err);
            }
            if let Some(error) = &response.error {
                tracing::debug!(handler = handler.name(), code = error.code, "handler reported an error");
                break;
            }
        }
        Ok(())
    }
}
