//! Fixtures shared by the handler tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pl_session::HttpSession;

use crate::identity_server::IdentityServer;
use crate::sts::LocalTokenService;
use crate::types::{
    Assertion, Attribute, AttributeStatement, Conditions, NameId, SamlBinding, SamlMessage,
    Subject,
};
use crate::writer;

use super::{
    ChainConfig, ExchangeOptions, IdpConfig, RoleListValidator, SamlHandlerRequest, SpConfig,
};

pub(crate) const IDP_URL: &str = "https://idp.example.com/idp/";
pub(crate) const SP_URL: &str = "https://sp.example.com/sales/";
pub(crate) const SP2_URL: &str = "https://sp2.example.com/employee/";

pub(crate) const IDP_KEY: &str = include_str!("../../testdata/idp-key.pem");
pub(crate) const IDP_CERT: &str = include_str!("../../testdata/idp-cert.pem");
pub(crate) const SP_CERT: &str = include_str!("../../testdata/sp-cert.pem");

pub(crate) struct IdpFixture {
    pub(crate) config: Arc<ChainConfig>,
    pub(crate) identity_server: Arc<IdentityServer>,
    pub(crate) sts: Arc<LocalTokenService>,
}

pub(crate) fn idp_fixture() -> IdpFixture {
    let identity_server = Arc::new(IdentityServer::new());
    let sts = Arc::new(LocalTokenService::new(std::time::Duration::from_secs(5)));
    let config = ChainConfig::idp(
        IdpConfig::new(IDP_URL).with_trust_domains("sp.example.com,sp2.example.com"),
    )
    .with_identity_server(identity_server.clone())
    .with_sts(sts.clone());

    IdpFixture {
        config: Arc::new(config),
        identity_server,
        sts,
    }
}

pub(crate) fn sp_config() -> ChainConfig {
    ChainConfig::sp(SpConfig::new(SP_URL, IDP_URL).with_trust_domains("idp.example.com"))
        .with_role_validator(Arc::new(RoleListValidator::new(["manager", "employee"])))
}

/// An inbound request as the binding layer would build it.
pub(crate) fn inbound(
    session: &Arc<HttpSession>,
    local_issuer: &str,
    message: SamlMessage,
) -> SamlHandlerRequest {
    SamlHandlerRequest {
        session: session.clone(),
        document: Some(writer::to_xml(&message).unwrap()),
        message: Some(message),
        issuer: local_issuer.to_string(),
        relay_state: None,
        binding: SamlBinding::HttpPost,
        redirect_signature: None,
        request_type: None,
        user_principal: None,
        options: ExchangeOptions::default(),
    }
}

/// An assertion for `principal` valid until `now + valid_for`.
pub(crate) fn assertion(principal: &str, valid_for: Duration) -> Assertion {
    let now = Utc::now();
    Assertion::new(IDP_URL)
        .with_subject(Subject::new(NameId::new(principal)))
        .with_conditions(Conditions {
            not_before: Some(now - Duration::minutes(10)),
            not_on_or_after: Some(now + valid_for),
            audiences: vec![SP_URL.to_string()],
        })
}

/// Adds one attribute statement with the given attributes.
pub(crate) fn with_attributes(mut assertion: Assertion, attributes: Vec<Attribute>) -> Assertion {
    assertion
        .attribute_statements
        .push(AttributeStatement { attributes });
    assertion
}
