//! Framework-neutral request and response views used by the filter.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use pl_session::HttpSession;

use crate::error::{SecurityError, SecurityResult};

/// Header marking an AJAX request.
const X_REQUESTED_WITH: &str = "x-requested-with";

/// What the caller should do after the filter ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Hand the request to the next handler.
    Proceed,
    /// The filter wrote the response; send it as is.
    Committed,
}

/// The parts of an HTTP request the filter inspects.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Request URI path, including the context path.
    pub uri: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Path under which the application is mounted (may be empty).
    pub context_path: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Query and form parameters.
    pub params: HashMap<String, String>,
    /// Session bound to the request.
    pub session: Arc<HttpSession>,
    /// DER client certificate presented during the TLS handshake.
    pub client_certificate: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request with no headers or parameters.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>, session: Arc<HttpSession>) -> Self {
        Self {
            method,
            uri: uri.into(),
            query: None,
            context_path: String::new(),
            headers: HeaderMap::new(),
            params: HashMap::new(),
            session,
            client_certificate: None,
        }
    }

    /// Sets the context path.
    #[must_use]
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    /// Sets the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Adds a header. Invalid values are dropped.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Attaches a client certificate.
    #[must_use]
    pub fn with_client_certificate(mut self, der: Vec<u8>) -> Self {
        self.client_certificate = Some(der);
        self
    }

    /// Returns the first value of a header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns the path followed by the query string, if any.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match self.query.as_deref() {
            Some(query) if !query.is_empty() => format!("{}?{query}", self.uri),
            _ => self.uri.clone(),
        }
    }

    /// Returns the URI with the context path stripped.
    #[must_use]
    pub fn path_within_context(&self) -> &str {
        let path = self
            .uri
            .strip_prefix(self.context_path.as_str())
            .unwrap_or(&self.uri);
        if path.is_empty() {
            "/"
        } else {
            path
        }
    }

    /// Returns true for requests sent with `X-Requested-With: XMLHttpRequest`.
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        self.header(X_REQUESTED_WITH)
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// Returns the context path, or `/` when the application is at the root.
    #[must_use]
    pub fn context_root(&self) -> &str {
        if self.context_path.is_empty() {
            "/"
        } else {
            &self.context_path
        }
    }
}

/// Response under construction by the filter and its schemes.
///
/// Once committed (by an error, a redirect or a written body) the response is
/// final and the request does not reach the application.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    committed: bool,
}

impl HttpResponse {
    /// Creates an uncommitted `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            committed: false,
        }
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status without committing.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replaces a header.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> SecurityResult<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SecurityError::Internal(format!("invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body as text.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns whether the response is final.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Sends an error status with a plain-text message.
    pub fn send_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.status = status;
        self.body = message.into().into_bytes();
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.committed = true;
    }

    /// Redirects the client.
    pub fn send_redirect(&mut self, location: &str) -> SecurityResult<()> {
        self.set_header(header::LOCATION, location)?;
        self.status = StatusCode::FOUND;
        self.committed = true;
        Ok(())
    }

    /// Writes a body with the given content type and commits.
    pub fn write_body(&mut self, status: StatusCode, content_type: &'static str, body: Vec<u8>) {
        self.status = status;
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body;
        self.committed = true;
    }

    /// Commits the response as it stands.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Splits the response into its parts.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
        (self.status, self.headers, self.body)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}
