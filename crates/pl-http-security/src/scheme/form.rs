use async_trait::async_trait;
use axum::http::Method;

use super::HttpAuthenticationScheme;
use crate::error::SecurityResult;
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::{Credentials, Identity};

const J_SECURITY_CHECK: &str = "j_security_check";
const J_USERNAME: &str = "j_username";
const J_PASSWORD: &str = "j_password";

/// Session attribute holding the URI requested before the login form.
const ORIGINAL_REQUEST_URI: &str = "picketlink.authc.form.originalUri";

/// HTML form authentication posting to `j_security_check`.
#[derive(Debug, Clone)]
pub struct FormAuthenticationScheme {
    login_page: String,
    error_page: String,
    restore_original_request: bool,
}

impl FormAuthenticationScheme {
    /// Creates the scheme.
    #[must_use]
    pub fn new(
        login_page: impl Into<String>,
        error_page: impl Into<String>,
        restore_original_request: bool,
    ) -> Self {
        Self {
            login_page: login_page.into(),
            error_page: error_page.into(),
            restore_original_request,
        }
    }

    fn is_login_request(request: &HttpRequest) -> bool {
        request.method == Method::POST && request.uri.ends_with(J_SECURITY_CHECK)
    }
}

#[async_trait]
impl HttpAuthenticationScheme for FormAuthenticationScheme {
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>> {
        if !Self::is_login_request(request) {
            return Ok(None);
        }

        match (request.param(J_USERNAME), request.param(J_PASSWORD)) {
            (Some(username), Some(password)) => Ok(Some(Credentials::Password {
                username: username.to_string(),
                password: password.to_string(),
            })),
            _ => Ok(None),
        }
    }

    async fn challenge_client(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        if self.restore_original_request && !Self::is_login_request(request) {
            request
                .session
                .set_attribute(ORIGINAL_REQUEST_URI, &request.path_and_query())?;
        }
        response.send_redirect(&format!("{}{}", request.context_path, self.login_page))
    }

    async fn on_post_authentication(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
        _identity: &Identity,
    ) -> SecurityResult<()> {
        let original = request
            .session
            .take_attribute::<String>(ORIGINAL_REQUEST_URI)?;

        let target = match original {
            Some(uri) if self.restore_original_request => uri,
            _ => request.context_root().to_string(),
        };
        response.send_redirect(&target)
    }

    async fn on_authentication_failure(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        response.send_redirect(&format!("{}{}", request.context_path, self.error_page))
    }
}
