use async_trait::async_trait;
use axum::http::{header, StatusCode};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{authorization, HttpAuthenticationScheme};
use crate::error::SecurityResult;
use crate::exchange::{HttpRequest, HttpResponse};
use crate::identity::{Credentials, DigestCredentials};

/// How long an issued nonce is accepted.
const NONCE_VALIDITY_SECONDS: i64 = 180;

/// HTTP Digest authentication.
///
/// Nonces are issued by the challenge and accepted only while they are
/// known and fresh. Computing and checking the response hash is left to
/// the identity manager, which owns the password.
#[derive(Debug)]
pub struct DigestAuthenticationScheme {
    realm: String,
    nonces: DashMap<String, DateTime<Utc>>,
}

impl DigestAuthenticationScheme {
    /// Creates the scheme for a realm.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            nonces: DashMap::new(),
        }
    }

    fn issue_nonce(&self) -> String {
        let now = Utc::now();
        self.nonces.retain(|_, issued| !expired(*issued, now));

        let nonce = Uuid::new_v4().simple().to_string();
        self.nonces.insert(nonce.clone(), now);
        nonce
    }

    fn is_valid_nonce(&self, nonce: &str) -> bool {
        match self.nonces.get(nonce).map(|issued| *issued) {
            Some(issued) if !expired(issued, Utc::now()) => true,
            Some(_) => {
                self.nonces.remove(nonce);
                false
            }
            None => false,
        }
    }
}

fn expired(issued: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - issued > Duration::seconds(NONCE_VALIDITY_SECONDS)
}

/// Parses the comma separated `name=value` pairs of a Digest header.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = &rest[end..];
        }
        params.push((name, value));

        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }
    params
}

#[async_trait]
impl HttpAuthenticationScheme for DigestAuthenticationScheme {
    fn extract_credentials(&self, request: &HttpRequest) -> SecurityResult<Option<Credentials>> {
        let Some(header_value) = authorization(request, "Digest") else {
            return Ok(None);
        };

        let mut digest = DigestCredentials {
            method: request.method.as_str().to_string(),
            ..DigestCredentials::default()
        };
        for (name, value) in parse_params(header_value) {
            match name.as_str() {
                "username" => digest.username = value,
                "realm" => digest.realm = value,
                "nonce" => digest.nonce = value,
                "uri" => digest.uri = value,
                "response" => digest.response = value,
                "qop" => digest.qop = Some(value),
                "nc" => digest.nc = Some(value),
                "cnonce" => digest.cnonce = Some(value),
                "opaque" => digest.opaque = Some(value),
                _ => {}
            }
        }

        if digest.username.is_empty() || digest.response.is_empty() {
            tracing::debug!("incomplete digest credentials");
            return Ok(None);
        }
        if !self.is_valid_nonce(&digest.nonce) {
            tracing::debug!(user = %digest.username, "unknown or stale digest nonce");
            return Ok(None);
        }

        Ok(Some(Credentials::Digest(digest)))
    }

    async fn challenge_client(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        let challenge = format!(
            "Digest realm=\"{}\",domain=\"{}\",nonce=\"{}\",algorithm=MD5,qop=\"auth\",stale=\"false\"",
            self.realm,
            request.context_root(),
            self.issue_nonce()
        );
        response.set_header(header::WWW_AUTHENTICATE, &challenge)?;
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
        let request = HttpRequest::new(Method::GET, "/docs", Arc::new(HttpSession::new()));
        match authorization {
            Some(value) => request.with_header(header::AUTHORIZATION, value),
            None => request,
        }
    }

    fn nonce_of(challenge: &str) -> String {
        parse_params(challenge.trim_start_matches("Digest "))
            .into_iter()
            .find(|(name, _)| name == "nonce")
            .map(|(_, value)| value)
            .unwrap()
    }

    #[test]
    fn parses_quoted_and_bare_values() {
        let params = parse_params(r#"username="john", nc=00000001, uri="/a,b", qop=auth"#);
        assert_eq!(
            params,
            vec![
                ("username".to_string(), "john".to_string()),
                ("nc".to_string(), "00000001".to_string()),
                ("uri".to_string(), "/a,b".to_string()),
                ("qop".to_string(), "auth".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn accepts_only_issued_nonces() {
        let scheme = DigestAuthenticationScheme::new("docs");
        let mut response = HttpResponse::new();
        scheme
            .challenge_client(&request(None), &mut response)
            .await
            .unwrap();

        let challenge = response.header("www-authenticate").unwrap().to_string();
        assert!(challenge.starts_with("Digest realm=\"docs\",domain=\"/\""));
        assert!(challenge.contains("algorithm=MD5"));
        let nonce = nonce_of(&challenge);

        let header = format!(
            r#"Digest username="john", realm="docs", nonce="{nonce}", uri="/docs", response="abc""#
        );
        let Some(Credentials::Digest(digest)) =
            scheme.extract_credentials(&request(Some(&header))).unwrap()
        else {
            panic!("expected digest credentials");
        };
        assert_eq!(digest.username, "john");
        assert_eq!(digest.method, "GET");

        let forged = r#"Digest username="john", nonce="forged", uri="/docs", response="abc""#;
        assert!(scheme
            .extract_credentials(&request(Some(forged)))
            .unwrap()
            .is_none());
    }
}
