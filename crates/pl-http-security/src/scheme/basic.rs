use async_trait::async_trait;
use axum::http::{header, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};

use super::{authorization, HttpAuthenticationScheme};
use crate::error::SecurityResult;
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::Credentials;

/// HTTP Basic authentication.
#[derive(Debug, Clone)]
pub struct BasicAuthenticationScheme {
    realm: String,
}

impl BasicAuthenticationScheme {
    /// Creates the scheme for a realm.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }

    /// Returns whether the request carries Basic credentials.
    #[must_use]
    pub fn is_basic_request(request: &HttpRequest) -> bool {
        authorization(request, "Basic").is_some()
    }
}

#[async_trait]
impl HttpAuthenticationScheme for BasicAuthenticationScheme {
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>> {
        let Some(encoded) = authorization(request, "Basic") else {
            return Ok(None);
        };

        let decoded = match STANDARD.decode(encoded) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "malformed basic credentials");
                return Ok(None);
            }
        };

        Ok(decoded
            .split_once(':')
            .map(|(username, password)| Credentials::Password {
                username: username.to_string(),
                password: password.to_string(),
            }))
    }

    async fn challenge_client(
        &self,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        response.set_header(
            header::WWW_AUTHENTICATE,
            &format!("Basic realm=\"{}\"", self.realm),
        )?;
        response.send_error(StatusCode::UNAUTHORIZED, "Authentication required.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Method;
    use pl_session::HttpSession;

    use super::*;

    fn request(authorization: Option<&str>) -> HttpRequest {
        let request = HttpRequest::new(Method::GET, "/admin", Arc::new(HttpSession::new()));
        match authorization {
            Some(value) => request.with_header(header::AUTHORIZATION, value),
            None => request,
        }
    }

    #[test]
    fn extracts_user_and_password() {
        let scheme = BasicAuthenticationScheme::new("test");
        let value = format!("Basic {}", STANDARD.encode("john:pa:ss"));

        let credentials = scheme.extract_credentials(&request(Some(&value))).unwrap();
        assert_eq!(
            credentials,
            Some(Credentials::Password {
                username: "john".into(),
                password: "pa:ss".into()
            })
        );
    }

    #[test]
    fn ignores_other_schemes_and_garbage() {
        let scheme = BasicAuthenticationScheme::new("test");

        assert!(scheme.extract_credentials(&request(None)).unwrap().is_none());
        assert!(scheme
            .extract_credentials(&request(Some("Bearer abc")))
            .unwrap()
            .is_none());
        assert!(scheme
            .extract_credentials(&request(Some("Basic !!!")))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn challenge_announces_realm() {
        let scheme = BasicAuthenticationScheme::new("Acme");
        let mut response = HttpResponse::new();
        scheme
            .challenge_client(&request(None), &mut response)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header("www-authenticate"),
            Some("Basic realm=\"Acme\"")
        );
        assert!(response.is_committed());
    }
}
