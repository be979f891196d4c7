//! The SAML handler chain.
//!
//! Every exchange runs an ordered list of [`SamlHandler`]s. A handler looks
//! at the message it is given and at the side of the exchange it runs on
//! (identity provider or service provider) and either contributes to the
//! outcome or does nothing. Handlers talk to each other through the
//! per-exchange [`SamlHandlerRequest`] and [`SamlHandlerResponse`]; only the
//! HTTP session outlives a round trip.
//!
//! Order matters: the attribute handler runs before the authentication
//! handler on the IDP so its attributes end up in the assertion, and after
//! it on the SP so the assertion is available to map.

mod attribute;
mod authentication;
mod chain;
mod context;
mod in_response_to;
mod issuer_trust;
mod logout;
mod signature;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;

use async_trait::async_trait;

pub use attribute::AttributeHandler;
pub use authentication::AuthenticationHandler;
pub use chain::{ChainConfig, HandlerRole, IdpConfig, ProviderConfig, SamlHandlerChain, SpConfig};
pub use context::{
    ExchangeOptions, GenerateRequestType, HandlerError, Outbound, SamlHandlerRequest,
    SamlHandlerResponse,
};
pub use in_response_to::InResponseToVerificationHandler;
pub use issuer_trust::IssuerTrustHandler;
pub use logout::LogoutHandler;
pub use signature::{SignatureGenerationHandler, SignatureValidationHandler};

use crate::error::SamlResult;
use crate::types::EncryptedAssertion;

/// One stage of the handler chain.
///
/// Every method defaults to a no-op. Implementations return early for
/// messages and sides they do not handle.
#[async_trait]
pub trait SamlHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Contributes to an outbound request the local party initiates.
    async fn generate_saml_request(
        &self,
        _request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        Ok(())
    }

    /// Handles an inbound `AuthnRequest` or `LogoutRequest`.
    async fn handle_request_type(
        &self,
        _request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        Ok(())
    }

    /// Handles an inbound `Response` or `LogoutResponse`.
    async fn handle_status_response_type(
        &self,
        _request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        Ok(())
    }

    /// Drops any per-handler state.
    fn reset(&self) -> SamlResult<()> {
        Ok(())
    }
}

/// Handler parameter names.
pub mod params {
    /// Do not add an `AuthnStatement` to issued assertions (IDP).
    pub const DISABLE_AUTHN_STATEMENT: &str = "DISABLE_AUTHN_STATEMENT";
    /// Do not add the role attribute to issued assertions (IDP).
    pub const DISABLE_SENDING_ROLES: &str = "DISABLE_SENDING_ROLES";
    /// Take no roles from received assertions (SP).
    pub const DISABLE_ROLE_PICKING: &str = "DISABLE_ROLE_PICKING";
    /// Comma-separated attribute names that carry roles (SP).
    pub const ROLE_KEY: &str = "ROLE_KEY";
    /// Tolerated clock difference in milliseconds when checking expiry (SP).
    pub const CLOCK_SKEW_MILIS: &str = "CLOCK_SKEW_MILIS";
    /// Assertion consumer URL put in `AuthnRequest`s (SP).
    pub const ASSERTION_CONSUMER_URL: &str = "ASSERTION_CONSUMER_URL";
    /// Name of the attribute manager registered on the chain (IDP).
    pub const ATTIBUTE_MANAGER: &str = "ATTIBUTE_MANAGER";
    /// Comma-separated attribute names to ask the attribute manager for (IDP).
    pub const ATTRIBUTE_KEYS: &str = "ATTRIBUTE_KEYS";
    /// Key received attributes by friendly name (SP).
    pub const ATTRIBUTE_CHOOSE_FRIENDLY_NAME: &str = "ATTRIBUTE_CHOOSE_FRIENDLY_NAME";
    /// `NameIDPolicy` format put in `AuthnRequest`s (SP).
    pub const NAMEID_FORMAT: &str = "NAMEID_FORMAT";
    /// Skip signature validation.
    pub const IGNORE_SIGNATURES: &str = "IGNORE_SIGNATURES";
    /// Sign only the assertion of a `Response`.
    pub const SIGN_ASSERTION_ONLY: &str = "SIGN_ASSERTION_ONLY";
    /// Sign both the assertion and the `Response`.
    pub const SIGN_RESPONSE_AND_ASSERTION: &str = "SIGN_RESPONSE_AND_ASSERTION";
    /// Chain option: the signing key pair.
    pub const KEYPAIR: &str = "KEYPAIR";
    /// Chain option: the role validator.
    pub const ROLE_VALIDATOR: &str = "ROLE_VALIDATOR";
    /// Chain option: skip role validation.
    pub const ROLE_VALIDATOR_IGNORE: &str = "ROLE_VALIDATOR_IGNORE";
}

/// Per-handler configuration: a bag of string parameters.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    parameters: HashMap<String, String>,
}

impl HandlerConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Returns whether a parameter is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Returns true when the parameter is set to `true`, ignoring case.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.parameter(name)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    /// Splits a comma-separated parameter into trimmed, non-empty tokens.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        self.parameter(name).map(tokenize).unwrap_or_default()
    }
}

pub(crate) fn tokenize(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decides whether a principal's roles grant access to the service.
pub trait RoleValidator: Send + Sync {
    /// Returns true when `roles` are acceptable for `principal`.
    fn user_in_role(&self, principal: &str, roles: &[String]) -> bool;
}

/// Accepts a principal holding at least one of a fixed set of roles.
#[derive(Debug, Clone, Default)]
pub struct RoleListValidator {
    roles: Vec<String>,
}

impl RoleListValidator {
    /// Creates a validator accepting any of `roles`.
    #[must_use]
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl RoleValidator for RoleListValidator {
    fn user_in_role(&self, _principal: &str, roles: &[String]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }
}

/// Looks up the attributes an IDP releases about a principal.
#[async_trait]
pub trait AttributeManager: Send + Sync {
    /// Returns the attributes named by `keys`, or every attribute when
    /// `keys` is empty.
    async fn attributes(
        &self,
        principal: &str,
        keys: &[String],
    ) -> SamlResult<HashMap<String, Vec<String>>>;
}

/// Attribute manager that releases nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyAttributeManager;

#[async_trait]
impl AttributeManager for EmptyAttributeManager {
    async fn attributes(
        &self,
        _principal: &str,
        _keys: &[String],
    ) -> SamlResult<HashMap<String, Vec<String>>> {
        Ok(HashMap::new())
    }
}

/// Decrypts an `EncryptedAssertion` into assertion XML.
pub trait AssertionDecrypter: Send + Sync {
    /// Decrypts with the service provider's private key (PKCS#8 DER).
    fn decrypt(&self, encrypted: &EncryptedAssertion, private_key_der: &[u8]) -> SamlResult<String>;
}
