//! Shared fixtures: an IDP and two SPs wired the way a deployment would
//! wire them, and helpers that carry messages between them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pl_core::config::LoggingConfig;
use pl_protocol_saml::bindings::{DecodedMessage, HttpPostBinding, HttpRedirectBinding};
use pl_protocol_saml::handlers::{
    params, AttributeHandler, AttributeManager, AuthenticationHandler, ChainConfig,
    GenerateRequestType, HandlerConfig, IdpConfig, InResponseToVerificationHandler,
    IssuerTrustHandler, LogoutHandler, Outbound, RoleListValidator, SamlHandlerChain,
    SamlHandlerRequest, SamlHandlerResponse, SignatureGenerationHandler,
    SignatureValidationHandler, SpConfig,
};
use pl_protocol_saml::signature::{certificate_from_pem, KeyPair};
use pl_protocol_saml::{IdentityServer, LocalTokenService, SamlResult};
use pl_session::{keys, HttpSession};

pub const IDP_URL: &str = "https://idp.example.com/idp/";
pub const SP_URL: &str = "https://sp.example.com/sales/";
pub const SP2_URL: &str = "https://sp2.example.com/employee/";

const IDP_KEY: &str = include_str!("../../../crates/pl-protocol-saml/testdata/idp-key.pem");
const IDP_CERT: &str = include_str!("../../../crates/pl-protocol-saml/testdata/idp-cert.pem");
const SP_KEY: &str = include_str!("../../../crates/pl-protocol-saml/testdata/sp-key.pem");
const SP_CERT: &str = include_str!("../../../crates/pl-protocol-saml/testdata/sp-cert.pem");

/// Installs the crate's subscriber once; `RUST_LOG` raises the level.
pub fn init_tracing() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        json: false,
    };
    // Later calls find the subscriber already installed.
    let _ = pl_core::logging::init_tracing(&config);
}

/// Attribute store of the IDP.
struct Directory;

#[async_trait]
impl AttributeManager for Directory {
    async fn attributes(
        &self,
        principal: &str,
        keys: &[String],
    ) -> SamlResult<HashMap<String, Vec<String>>> {
        let mut attributes = HashMap::from([
            ("email".to_string(), vec![format!("{principal}@example.com")]),
            ("department".to_string(), vec!["sales".to_string()]),
        ]);
        attributes.retain(|name, _| keys.is_empty() || keys.contains(name));
        Ok(attributes)
    }
}

/// One party of the federation.
pub struct Provider {
    pub entity_id: &'static str,
    pub chain: SamlHandlerChain,
}

/// The outcome of handing one message to a provider.
pub struct Exchange {
    pub outcome: SamlResult<()>,
    pub response: SamlHandlerResponse,
}

impl Exchange {
    /// The message the provider sends back.
    pub fn reply(&self) -> anyhow::Result<Outbound> {
        if let Err(err) = &self.outcome {
            anyhow::bail!("exchange failed: {err}");
        }
        self.response
            .outbound()?
            .ok_or_else(|| anyhow::anyhow!("provider sent nothing back"))
    }
}

impl Provider {
    /// Starts an exchange initiated by this provider.
    pub async fn generate(
        &self,
        session: &Arc<HttpSession>,
        request_type: GenerateRequestType,
        post_binding: bool,
    ) -> anyhow::Result<Outbound> {
        let mut request = SamlHandlerRequest::generate(Arc::clone(session), self.entity_id, request_type);
        let mut response = SamlHandlerResponse::new();
        response.post_binding = post_binding;

        self.chain
            .generate_saml_request(&mut request, &mut response)
            .await?;
        response
            .outbound()?
            .ok_or_else(|| anyhow::anyhow!("no request generated"))
    }

    /// Hands a message arriving from the browser to this provider.
    pub async fn receive(
        &self,
        session: &Arc<HttpSession>,
        message: &Outbound,
    ) -> anyhow::Result<Exchange> {
        let decoded = deliver(message)?;
        let mut request = SamlHandlerRequest::inbound(Arc::clone(session), self.entity_id, decoded)?;
        let mut response = SamlHandlerResponse::new();

        let outcome = self.chain.process(&mut request, &mut response).await;
        Ok(Exchange { outcome, response })
    }
}

/// Decodes what the browser would submit for `message`.
pub fn deliver(message: &Outbound) -> anyhow::Result<DecodedMessage> {
    Ok(match message {
        Outbound::Post(html) => HttpPostBinding::decode_form(html)?,
        Outbound::Redirect(url) => HttpRedirectBinding::decode_url(url)?,
    })
}

/// The target a browser carrying `message` would go to.
pub fn destination(message: &Outbound) -> String {
    match message {
        Outbound::Post(html) => {
            let marker = r#"action=""#;
            html.find(marker)
                .map(|start| {
                    let rest = &html[start + marker.len()..];
                    rest[..rest.find('"').unwrap_or(rest.len())].to_string()
                })
                .unwrap_or_default()
        }
        Outbound::Redirect(url) => url.split('?').next().unwrap_or_default().to_string(),
    }
}

/// The identity provider and the services it backs.
pub struct Idp {
    pub provider: Provider,
    pub identity_server: Arc<IdentityServer>,
    pub sts: Arc<LocalTokenService>,
}

pub fn idp() -> anyhow::Result<Idp> {
    let identity_server = Arc::new(IdentityServer::new());
    let sts = Arc::new(LocalTokenService::new(std::time::Duration::from_secs(5)));
    let config = Arc::new(
        ChainConfig::idp(
            IdpConfig::new(IDP_URL)
                .with_trust_domains("sp.example.com,sp2.example.com")
                .with_attribute_manager("directory"),
        )
        .with_keypair(KeyPair::from_pem(IDP_KEY, Some(IDP_CERT))?)
        .with_trusted_certificate(certificate_from_pem(SP_CERT)?)
        .with_identity_server(identity_server.clone())
        .with_sts(sts.clone())
        .with_attribute_manager("directory", Arc::new(Directory)),
    );

    let chain = SamlHandlerChain::new(config.clone())
        .with(IssuerTrustHandler::new(config.clone(), HandlerConfig::new())?)
        .with(SignatureValidationHandler::new(config.clone(), HandlerConfig::new())?)
        .with(LogoutHandler::new(config.clone(), HandlerConfig::new())?)
        .with(AttributeHandler::new(
            config.clone(),
            HandlerConfig::new().with(params::ATTRIBUTE_KEYS, "email"),
        )?)
        .with(AuthenticationHandler::new(config.clone(), HandlerConfig::new())?)
        .with(SignatureGenerationHandler::new(config, HandlerConfig::new())?);

    Ok(Idp {
        provider: Provider {
            entity_id: IDP_URL,
            chain,
        },
        identity_server,
        sts,
    })
}

/// A service provider at `entity_id` trusting the IDP.
pub fn sp(entity_id: &'static str) -> anyhow::Result<Provider> {
    let config = Arc::new(
        ChainConfig::sp(SpConfig::new(entity_id, IDP_URL).with_trust_domains("idp.example.com"))
            .with_keypair(KeyPair::from_pem(SP_KEY, Some(SP_CERT))?)
            .with_trusted_certificate(certificate_from_pem(IDP_CERT)?)
            .with_role_validator(Arc::new(RoleListValidator::new(["manager", "employee"]))),
    );

    let chain = SamlHandlerChain::new(config.clone())
        .with(IssuerTrustHandler::new(config.clone(), HandlerConfig::new())?)
        .with(SignatureValidationHandler::new(config.clone(), HandlerConfig::new())?)
        .with(LogoutHandler::new(config.clone(), HandlerConfig::new())?)
        .with(AuthenticationHandler::new(
            config.clone(),
            HandlerConfig::new().with(params::ROLE_KEY, "Role"),
        )?)
        .with(InResponseToVerificationHandler::new(config.clone(), HandlerConfig::new())?)
        .with(AttributeHandler::new(config.clone(), HandlerConfig::new())?)
        .with(SignatureGenerationHandler::new(config, HandlerConfig::new())?);

    Ok(Provider { entity_id, chain })
}

/// Logs `principal` in at the IDP, as its login form would.
pub fn idp_login(principal: &str, roles: &[&str]) -> anyhow::Result<Arc<HttpSession>> {
    let session = Arc::new(HttpSession::new());
    session.set_attribute(keys::PRINCIPAL_ID, principal)?;
    session.set_attribute(keys::ROLES, roles)?;
    Ok(session)
}

/// Runs browser SSO for `sp`, returning the IDP's answer as delivered to
/// the SP and the SP's verdict on it.
pub async fn single_sign_on(
    idp: &Idp,
    sp: &Provider,
    idp_session: &Arc<HttpSession>,
    sp_session: &Arc<HttpSession>,
    post_binding: bool,
) -> anyhow::Result<(Outbound, Exchange)> {
    let authn_request = sp
        .generate(sp_session, GenerateRequestType::Authentication, post_binding)
        .await?;
    let issued = idp.provider.receive(idp_session, &authn_request).await?;
    let answer = issued.reply()?;
    let verdict = sp.receive(sp_session, &answer).await?;
    Ok((answer, verdict))
}
