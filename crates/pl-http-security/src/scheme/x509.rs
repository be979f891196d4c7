use async_trait::async_trait;
use axum::http::StatusCode;
use regex::Regex;

use super::HttpAuthenticationScheme;
use crate::error::{SecurityError, SecurityResult};
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::Credentials;

/// TLS client certificate authentication.
#[derive(Debug, Clone)]
pub struct X509AuthenticationScheme {
    subject_regex: Option<Regex>,
}

impl X509AuthenticationScheme {
    /// Creates the scheme. When `subject_regex` is set its first capture
    /// group, applied to the subject DN, is the user name; otherwise the
    /// subject CN is used.
    pub fn new(subject_regex: Option<&str>) -> SecurityResult<Self> {
        let subject_regex = subject_regex
            .map(Regex::new)
            .transpose()
            .map_err(|e| SecurityError::Configuration(format!("invalid subject regex: {e}")))?;
        Ok(Self { subject_regex })
    }

    fn user_name(&self, subject_dn: &str, common_name: Option<String>) -> Option<String> {
        match &self.subject_regex {
            Some(regex) => regex
                .captures(subject_dn)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string()),
            None => common_name,
        }
    }
}

#[async_trait]
impl HttpAuthenticationScheme for X509AuthenticationScheme {
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>> {
        let Some(certificate) = &request.client_certificate else {
            return Ok(None);
        };

        let (subject_dn, common_name) = match pl_crypto::subject_common_name(certificate) {
            Ok(subject) => subject,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable client certificate");
                return Ok(None);
            }
        };

        Ok(self
            .user_name(&subject_dn, common_name)
            .map(|username| Credentials::X509 {
                username,
                certificate: certificate.clone(),
            }))
    }

    async fn challenge_client(
        &self,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        response.send_error(StatusCode::UNAUTHORIZED, "Client certificate required.");
        Ok(())
    }
}
