//! Axum middleware running the [`SecurityFilter`].
//!
//! Sessions are bound through the `PLSESSIONID` cookie. Form bodies are
//! buffered so the form scheme can read `j_username` and `j_password`; the
//! buffered bytes are handed on to the application unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pl_session::{HttpSession, SessionStore};

use crate::exchange::{FilterOutcome, HttpRequest, HttpResponse};
use crate::filter::SecurityFilter;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "PLSESSIONID";

/// Largest form body buffered for credential extraction.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// DER client certificate, inserted into request extensions by the TLS
/// terminator.
#[derive(Debug, Clone)]
pub struct ClientCertificate(pub Vec<u8>);

/// Shared state for [`security_layer`].
#[derive(Clone)]
pub struct SecurityState {
    /// The filter.
    pub filter: Arc<SecurityFilter>,
    /// Session storage.
    pub sessions: Arc<SessionStore>,
    /// Path the application is mounted under.
    pub context_path: String,
}

impl SecurityState {
    /// Creates the state for an application mounted at the root.
    #[must_use]
    pub fn new(filter: Arc<SecurityFilter>, sessions: Arc<SessionStore>) -> Self {
        Self {
            filter,
            sessions,
            context_path: String::new(),
        }
    }

    /// Sets the context path.
    #[must_use]
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }
}

/// Security middleware.
///
/// Install with `axum::middleware::from_fn_with_state(state, security_layer)`.
/// Requests that proceed carry their `Arc<HttpSession>` as an extension.
pub async fn security_layer(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let cookie_session = session_cookie(&parts.headers);
    let session = state.sessions.get_or_create(cookie_session.as_deref());

    let mut params: HashMap<String, String> = parts
        .uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let body = if is_form(&parts.headers) {
        let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "could not read form body");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        };
        params.extend(url::form_urlencoded::parse(&bytes).into_owned());
        Body::from(bytes)
    } else {
        body
    };

    let mut exchange = HttpRequest::new(parts.method.clone(), parts.uri.path(), Arc::clone(&session))
        .with_context_path(state.context_path.clone());
    exchange.query = parts.uri.query().map(str::to_string);
    exchange.headers = parts.headers.clone();
    exchange.params = params;
    exchange.client_certificate = parts
        .extensions
        .get::<ClientCertificate>()
        .map(|cert| cert.0.clone());

    let mut response = HttpResponse::new();
    let mut reply = match state.filter.do_filter(&exchange, &mut response).await {
        FilterOutcome::Proceed => {
            parts.extensions.insert(Arc::clone(&session));
            next.run(Request::from_parts(parts, body)).await
        }
        FilterOutcome::Committed => {
            let (status, headers, body) = response.into_parts();
            (status, headers, body).into_response()
        }
    };

    bind_session(&state, &session, cookie_session.as_deref(), &mut reply);
    reply
}

fn bind_session(
    state: &SecurityState,
    session: &HttpSession,
    cookie_session: Option<&str>,
    reply: &mut Response,
) {
    if session.is_invalidated() {
        state.sessions.remove(session.id());
        return;
    }
    if cookie_session == Some(session.id()) {
        return;
    }

    let path = if state.context_path.is_empty() {
        "/"
    } else {
        &state.context_path
    };
    let cookie = format!("{SESSION_COOKIE}={}; Path={path}; HttpOnly", session.id());
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            reply.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "invalid session cookie"),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}
