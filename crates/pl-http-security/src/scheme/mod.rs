//! HTTP authentication schemes.
//!
//! A scheme knows how to pull credentials out of a request, how to ask the
//! client for them and what to do once the user is authenticated. The filter
//! resolves one scheme instance per path configuration when it is built.

mod basic;
mod digest;
mod form;
mod token;
mod x509;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use basic::BasicAuthenticationScheme;
pub use digest::DigestAuthenticationScheme;
pub use form::FormAuthenticationScheme;
pub use token::TokenAuthenticationScheme;
pub use x509::X509AuthenticationScheme;

use crate::error::{SecurityError, SecurityResult};
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::{Account, Credentials, Identity};
use crate::path::AuthenticationConfig;

/// An HTTP authentication mechanism.
#[async_trait]
pub trait HttpAuthenticationScheme: Send + Sync {
    /// Returns the credentials carried by the request, if any.
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>>;

    /// Asks the client to authenticate.
    async fn challenge_client(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()>;

    /// Runs after a successful login.
    async fn on_post_authentication(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
        _identity: &Identity,
    ) -> SecurityResult<()> {
        Ok(())
    }

    /// Runs after the credentials were rejected.
    async fn on_authentication_failure(
        &self,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        Ok(())
    }
}

/// Issues tokens for the token scheme.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Issues a token for an authenticated account.
    async fn issue(&self, account: &Account) -> SecurityResult<String>;
}

/// Resolves the scheme for an authentication configuration.
pub(crate) fn resolve(
    config: &AuthenticationConfig,
    custom: &HashMap<String, Arc<dyn HttpAuthenticationScheme>>,
    token_provider: Option<&Arc<dyn TokenProvider>>,
) -> SecurityResult<Arc<dyn HttpAuthenticationScheme>> {
    let scheme: Arc<dyn HttpAuthenticationScheme> = match config {
        AuthenticationConfig::Basic { realm } => Arc::new(BasicAuthenticationScheme::new(realm)),
        AuthenticationConfig::Digest { realm } => Arc::new(DigestAuthenticationScheme::new(realm)),
        AuthenticationConfig::Form {
            login_page,
            error_page,
            restore_original_request,
        } => Arc::new(FormAuthenticationScheme::new(
            login_page,
            error_page,
            *restore_original_request,
        )),
        AuthenticationConfig::Token => {
            let provider = token_provider.ok_or_else(|| {
                SecurityError::Configuration(
                    "token authentication requires a token provider".to_string(),
                )
            })?;
            Arc::new(TokenAuthenticationScheme::new(Arc::clone(provider)))
        }
        AuthenticationConfig::X509 { subject_regex } => {
            Arc::new(X509AuthenticationScheme::new(subject_regex.as_deref())?)
        }
        AuthenticationConfig::Custom { scheme_id } => custom
            .get(scheme_id)
            .cloned()
            .ok_or_else(|| {
                SecurityError::Configuration(format!(
                    "no authentication scheme registered with id [{scheme_id}]"
                ))
            })?,
    };
    Ok(scheme)
}

/// Splits an `Authorization` header into scheme name and the rest.
fn authorization<'a>(request: &'a HttpRequest, scheme: &str) -> Option<&'a str> {
    let value = request.header("authorization")?;
    let (name, rest) = value.split_once(' ')?;
    name.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_custom_scheme_is_a_configuration_error() {
        let err = resolve(
            &AuthenticationConfig::Custom {
                scheme_id: "saml".into(),
            },
            &HashMap::new(),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SecurityError::Configuration(_)));
    }

    #[test]
    fn token_scheme_needs_provider() {
        let err = resolve(&AuthenticationConfig::Token, &HashMap::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, SecurityError::Configuration(_)));
    }

    #[test]
    fn builtins_resolve() {
        for config in [
            AuthenticationConfig::basic(),
            AuthenticationConfig::digest(),
            AuthenticationConfig::form(),
            AuthenticationConfig::X509 {
                subject_regex: Some("CN=(.*?),".into()),
            },
        ] {
            assert!(resolve(&config, &HashMap::new(), None).is_ok());
        }
    }
}
