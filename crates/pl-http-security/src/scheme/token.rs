use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, StatusCode};

use super::{authorization, BasicAuthenticationScheme, HttpAuthenticationScheme, TokenProvider};
use crate::error::{SecurityError, SecurityResult};
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::{Credentials, Identity};
use crate::path::DEFAULT_REALM;

/// Token authentication.
///
/// Clients first log in with Basic credentials and receive a token in the
/// response body. Later requests send `Authorization: Token <value>`.
pub struct TokenAuthenticationScheme {
    primary: BasicAuthenticationScheme,
    provider: Arc<dyn TokenProvider>,
}

impl TokenAuthenticationScheme {
    /// Creates the scheme around a token provider.
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            primary: BasicAuthenticationScheme::new(DEFAULT_REALM),
            provider,
        }
    }
}

impl std::fmt::Debug for TokenAuthenticationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticationScheme").finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpAuthenticationScheme for TokenAuthenticationScheme {
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>> {
        if let Some(credentials) = self.primary.extract_credentials(request)? {
            return Ok(Some(credentials));
        }
        Ok(authorization(request, "Token")
            .filter(|token| !token.is_empty())
            .map(|token| Credentials::Token(token.to_string())))
    }

    async fn challenge_client(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        if BasicAuthenticationScheme::is_basic_request(request) {
            return self.primary.challenge_client(request, response).await;
        }
        response.set_header(header::WWW_AUTHENTICATE, "Token")?;
        response.send_error(StatusCode::UNAUTHORIZED, "Authentication required.");
        Ok(())
    }

    async fn on_post_authentication(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        identity: &Identity,
    ) -> SecurityResult<()> {
        if !BasicAuthenticationScheme::is_basic_request(request) {
            return Ok(());
        }

        let account = identity.account()?.ok_or_else(|| {
            SecurityError::Authentication("no account bound after login".to_string())
        })?;
        let token = self.provider.issue(&account).await?;
        tracing::debug!(user = %account.login_name, "issued authentication token");

        let body = serde_json::json!({ "authctoken": token }).to_string();
        response.write_body(StatusCode::OK, "application/json", body.into_bytes());
        Ok(())
    }
}
