//! Rejects messages whose issuer host is outside the trusted domains.

use std::sync::Arc;

use async_trait::async_trait;
use pl_core::{AuditEvent, AuditEventType};

use crate::error::{SamlError, SamlResult};

use super::authentication::who_is_auditing;
use super::{ChainConfig, HandlerConfig, SamlHandler, SamlHandlerRequest, SamlHandlerResponse};

/// Checks the issuer of every inbound message, on both sides.
pub struct IssuerTrustHandler {
    config: Arc<ChainConfig>,
}

impl IssuerTrustHandler {
    /// Creates the handler.
    pub fn new(config: Arc<ChainConfig>, _params: HandlerConfig) -> SamlResult<Self> {
        Ok(Self { config })
    }

    fn trust(&self, request: &SamlHandlerRequest) -> SamlResult<()> {
        let Some(message) = &request.message else {
            return Ok(());
        };
        let issuer = message.issuer();

        if let Err(reason) = self.check(issuer) {
            tracing::warn!(%issuer, %reason, "issuer not trusted");
            self.config.audit(
                &AuditEvent::builder(AuditEventType::ErrorTrustedDomain)
                    .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                    .destination(issuer)
                    .session(request.session.id())
                    .failure(&reason)
                    .build(),
            );
            return Err(SamlError::processing_caused_by(
                reason,
                SamlError::IssuerNotTrusted(issuer.to_string()),
            ));
        }
        Ok(())
    }

    fn check(&self, issuer: &str) -> Result<(), String> {
        let domains = self
            .config
            .provider
            .trust_domains()
            .ok_or_else(|| "trust element missing".to_string())?;
        let host = issuer_host(issuer).ok_or_else(|| format!("issuer '{issuer}' has no host"))?;

        if is_trusted(domains, &host) {
            tracing::debug!(%host, "issuer trusted");
            Ok(())
        } else {
            Err(format!("issuer host '{host}' is not in '{domains}'"))
        }
    }
}

fn issuer_host(issuer: &str) -> Option<String> {
    url::Url::parse(issuer)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

/// The trusted list mentions the host, or the host contains one of the
/// listed domains past its first character.
fn is_trusted(domains: &str, host: &str) -> bool {
    domains.contains(host)
        || domains
            .split(',')
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .any(|domain| host.find(domain).is_some_and(|index| index > 0))
}

#[async_trait]
impl SamlHandler for IssuerTrustHandler {
    fn name(&self) -> &'static str {
        "issuer-trust"
    }

    async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.trust(request)
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        self.trust(request)
    }
}
