//! The per-request security filter.
//!
//! For every request the filter resolves the path configuration, lets the
//! path's authentication scheme extract credentials and log the user in,
//! enforces method and authorization rules on secured paths and finally
//! decides whether the request proceeds, is redirected or fails.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use pl_core::config::SecurityConfig;
use pl_core::AuditHelper;
use pl_session::keys;

use crate::authorizer::{ExpressionEvaluator, PathAuthorizer, PolicyAuthorizer};
use crate::error::{SecurityError, SecurityResult};
use crate::exchange::{FilterOutcome, HttpRequest, HttpResponse};
use crate::identity::{AuthenticationStatus, Identity, IdentityManager};
use crate::matcher::PathMatcher;
use crate::path::{Outcome, PathConfiguration};
use crate::scheme::{self, HttpAuthenticationScheme, TokenProvider};

/// Path-based security filter.
///
/// Built once with every path configuration, authentication schemes and
/// authorizers resolved up front; shared by all requests afterwards.
pub struct SecurityFilter {
    matcher: PathMatcher,
    permissive: bool,
    identity_manager: Arc<dyn IdentityManager>,
    /// Schemes keyed by path id, in configuration order.
    schemes: Vec<(String, Arc<dyn HttpAuthenticationScheme>)>,
    authorizers: HashMap<String, Vec<Arc<dyn PathAuthorizer>>>,
    audit: Option<AuditHelper>,
}

impl std::fmt::Debug for SecurityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityFilter")
            .field("matcher", &self.matcher)
            .field("permissive", &self.permissive)
            .finish_non_exhaustive()
    }
}

impl SecurityFilter {
    /// Starts building a filter.
    #[must_use]
    pub fn builder(identity_manager: Arc<dyn IdentityManager>) -> SecurityFilterBuilder {
        SecurityFilterBuilder {
            identity_manager,
            permissive: false,
            paths: Vec::new(),
            schemes: HashMap::new(),
            authorizers: HashMap::new(),
            token_provider: None,
            expression_evaluator: None,
            audit: None,
        }
    }

    /// Returns the path matcher.
    #[must_use]
    pub const fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Runs the filter for one request.
    ///
    /// Returns [`FilterOutcome::Committed`] when `response` holds the final
    /// answer (challenge, redirect or error) and [`FilterOutcome::Proceed`]
    /// when the request should reach the application.
    pub async fn do_filter(&self, request: &HttpRequest, response: &mut HttpResponse) -> FilterOutcome {
        tracing::debug!(method = %request.method, uri = %request.uri, "processing request");

        let mut identity = Identity::new(
            Arc::clone(&request.session),
            Arc::clone(&self.identity_manager),
        );
        if let Some(audit) = &self.audit {
            identity = identity.with_audit(audit.clone());
        }
        let path = self.matcher.match_path(
            &request.uri,
            &request.context_path,
            &request.method,
            &request.headers,
        );

        let result = match self.enforce(path, request, response, &identity).await {
            Ok(()) => self.outbound(path, request, response),
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => self.handle_error(path, request, response, &err),
        }
    }

    async fn enforce(
        &self,
        path: Option<&PathConfiguration>,
        request: &HttpRequest,
        response: &mut HttpResponse,
        identity: &Identity,
    ) -> SecurityResult<()> {
        self.authenticate_if_required(path, request, response, identity)
            .await?;

        let Some(path) = path.filter(|p| p.is_secured()) else {
            return Ok(());
        };

        if !path.is_method_allowed(&request.method) {
            return Err(SecurityError::MethodNotAllowed(format!(
                "The given method is not allowed [{}] for path [{}].",
                request.method,
                path.uri()
            )));
        }

        if response.is_committed() {
            return Ok(());
        }

        if !identity.is_logged_in() {
            self.challenge(path, request, response).await?;
        } else if path.is_logout() {
            identity.logout();
        } else if !self.is_authorized(path, request, identity)? {
            return Err(SecurityError::AccessDenied(format!(
                "The request for the given path [{}] was forbidden.",
                path.uri()
            )));
        }

        Ok(())
    }

    async fn authenticate_if_required(
        &self,
        path: Option<&PathConfiguration>,
        request: &HttpRequest,
        response: &mut HttpResponse,
        identity: &Identity,
    ) -> SecurityResult<()> {
        let scheme = match path {
            Some(path) => self.scheme_for(path),
            None => self.restore_previous_scheme(request)?,
        };

        let Some(scheme) = scheme else {
            if !identity.is_logged_in() {
                if let Some(path) = path.filter(|p| p.authorization().is_some()) {
                    return Err(SecurityError::AuthenticationRequired(format!(
                        "The given path [{}] requires authentication.",
                        path.uri()
                    )));
                }
            }
            return Ok(());
        };

        let mut credentials = scheme.extract_credentials(request)?;
        if credentials.is_some() && identity.is_logged_in() {
            tracing::debug!("forcing re-authentication, logging out current user");
            identity.logout();
            credentials = scheme.extract_credentials(request)?;
        }

        let Some(credentials) = credentials else {
            return Ok(());
        };

        let status = identity.login(&credentials).await;
        match status {
            Ok(AuthenticationStatus::Success) => {
                match scheme
                    .on_post_authentication(request, response, identity)
                    .await
                {
                    Err(SecurityError::Authentication(reason)) => {
                        tracing::warn!(user = ?credentials.user_id(), %reason, "authentication failed");
                    }
                    other => other?,
                }
            }
            Ok(AuthenticationStatus::Failed) => {
                tracing::warn!(user = ?credentials.user_id(), "authentication failed");
                scheme.on_authentication_failure(request, response).await?;
            }
            Err(err) => {
                tracing::warn!(user = ?credentials.user_id(), error = %err, "authentication failed");
                scheme.on_authentication_failure(request, response).await?;
            }
        }

        Ok(())
    }

    fn scheme_for(&self, path: &PathConfiguration) -> Option<Arc<dyn HttpAuthenticationScheme>> {
        self.schemes
            .iter()
            .find(|(id, _)| id == path.id())
            .map(|(_, scheme)| Arc::clone(scheme))
    }

    /// Finds the scheme that challenged the client earlier, for requests that
    /// answer a challenge outside any configured path (`j_security_check`).
    fn restore_previous_scheme(
        &self,
        request: &HttpRequest,
    ) -> SecurityResult<Option<Arc<dyn HttpAuthenticationScheme>>> {
        for (path_id, scheme) in &self.schemes {
            if scheme.extract_credentials(request)?.is_none() {
                continue;
            }
            let original = request
                .session
                .string_attribute(keys::AUTHENTICATION_ORIGINAL_PATH);
            if original.as_deref() == Some(path_id.as_str()) {
                request
                    .session
                    .remove_attribute(keys::AUTHENTICATION_ORIGINAL_PATH);
                return Ok(Some(Arc::clone(scheme)));
            }
        }
        Ok(None)
    }

    async fn challenge(
        &self,
        path: &PathConfiguration,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<()> {
        let Some(scheme) = self.scheme_for(path) else {
            return Ok(());
        };

        tracing::debug!(path = %path.uri(), "challenging client for credentials");
        scheme.challenge_client(request, response).await?;

        if request.session.string_attribute(keys::AUTHENTICATION_ORIGINAL_PATH).as_deref()
            != Some(path.id())
        {
            request
                .session
                .set_attribute(keys::AUTHENTICATION_ORIGINAL_PATH, path.id())?;
        }
        Ok(())
    }

    fn is_authorized(
        &self,
        path: &PathConfiguration,
        request: &HttpRequest,
        identity: &Identity,
    ) -> SecurityResult<bool> {
        let Some(authorizers) = self.authorizers.get(path.id()) else {
            return Ok(true);
        };
        let account = identity.account()?;
        for authorizer in authorizers {
            if !authorizer.authorize(path, request, account.as_ref())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn outbound(
        &self,
        path: Option<&PathConfiguration>,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> SecurityResult<FilterOutcome> {
        if response.is_committed() {
            tracing::debug!(uri = %request.uri, "response already committed");
            return Ok(FilterOutcome::Committed);
        }

        match path {
            Some(path) if path.is_secured() => {
                let mut redirect = path.redirect(Outcome::Ok).map(str::to_string);

                if path.is_logout() && redirect.is_none() {
                    if request.is_ajax() {
                        response.set_status(StatusCode::NO_CONTENT);
                        response.commit();
                        return Ok(FilterOutcome::Committed);
                    }
                    redirect = Some(request.context_root().to_string());
                }

                match redirect {
                    Some(url) => {
                        redirect_to(&url, request, response)?;
                        Ok(FilterOutcome::Committed)
                    }
                    None => Ok(FilterOutcome::Proceed),
                }
            }
            Some(_) => Ok(FilterOutcome::Proceed),
            None if self.permissive => Ok(FilterOutcome::Proceed),
            None => {
                response.send_error(
                    StatusCode::FORBIDDEN,
                    format!("No configuration found for the given path [{}] ", request.uri),
                );
                Ok(FilterOutcome::Committed)
            }
        }
    }

    fn handle_error(
        &self,
        path: Option<&PathConfiguration>,
        request: &HttpRequest,
        response: &mut HttpResponse,
        err: &SecurityError,
    ) -> FilterOutcome {
        tracing::debug!(uri = %request.uri, error = %err, "handling security error");

        if response.is_committed() {
            tracing::error!(uri = %request.uri, error = %err, "error after response was committed");
            return FilterOutcome::Committed;
        }

        let secured = path.filter(|p| p.is_secured());
        let redirect = match err {
            SecurityError::AuthenticationRequired(_) | SecurityError::MethodNotAllowed(_) => None,
            SecurityError::AccessDenied(_) => secured.and_then(|p| p.redirect(Outcome::Forbidden)),
            _ => secured.and_then(|p| p.redirect(Outcome::Error)),
        };

        if let Some(url) = redirect {
            match redirect_to(url, request, response) {
                Ok(()) => return FilterOutcome::Committed,
                Err(e) => tracing::error!(error = %e, %url, "could not redirect"),
            }
        }

        let status = err.status_code();
        tracing::error!(
            uri = %request.uri,
            status = status.as_u16(),
            error = %err,
            "error during security processing, sending error"
        );
        response.send_error(status, err.client_message());
        FilterOutcome::Committed
    }
}

fn redirect_to(url: &str, request: &HttpRequest, response: &mut HttpResponse) -> SecurityResult<()> {
    let url = format_redirect_url(url, &request.context_path);
    tracing::debug!(%url, "redirecting");
    response.send_redirect(&url)
}

/// Prefixes relative redirect URLs with the context path.
fn format_redirect_url(url: &str, context_path: &str) -> String {
    if url.starts_with('/') && !url.starts_with(context_path) {
        format!("{context_path}{url}")
    } else {
        url.to_string()
    }
}

/// Builder for [`SecurityFilter`].
#[must_use]
pub struct SecurityFilterBuilder {
    identity_manager: Arc<dyn IdentityManager>,
    permissive: bool,
    paths: Vec<PathConfiguration>,
    schemes: HashMap<String, Arc<dyn HttpAuthenticationScheme>>,
    authorizers: HashMap<String, Arc<dyn PathAuthorizer>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    expression_evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    audit: Option<AuditHelper>,
}

impl SecurityFilterBuilder {
    /// Lets requests matching no path through instead of rejecting them.
    pub fn permissive(mut self, permissive: bool) -> Self {
        self.permissive = permissive;
        self
    }

    /// Applies the runtime security configuration.
    pub fn config(self, config: &SecurityConfig) -> Self {
        self.permissive(config.permissive)
    }

    /// Adds a path configuration.
    pub fn path(mut self, path: PathConfiguration) -> Self {
        self.paths.push(path);
        self
    }

    /// Registers a custom authentication scheme.
    pub fn scheme(mut self, id: impl Into<String>, scheme: Arc<dyn HttpAuthenticationScheme>) -> Self {
        self.schemes.insert(id.into(), scheme);
        self
    }

    /// Registers a custom path authorizer.
    pub fn authorizer(mut self, id: impl Into<String>, authorizer: Arc<dyn PathAuthorizer>) -> Self {
        self.authorizers.insert(id.into(), authorizer);
        self
    }

    /// Sets the token provider used by the token scheme.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Sets the evaluator for authorization expressions.
    pub fn expression_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.expression_evaluator = Some(evaluator);
        self
    }

    /// Audits logins and logouts through `audit`.
    pub fn audit(mut self, audit: AuditHelper) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Resolves every scheme and authorizer and builds the filter.
    pub fn build(self) -> SecurityResult<SecurityFilter> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut paths = self.paths;
        for path in &mut paths {
            let n = counts.entry(path.uri().to_string()).or_default();
            path.set_id(format!("{}[{n}]", path.uri()));
            *n += 1;
        }

        let policy: Arc<dyn PathAuthorizer> = Arc::new(match &self.expression_evaluator {
            Some(evaluator) => PolicyAuthorizer::with_evaluator(Arc::clone(evaluator)),
            None => PolicyAuthorizer::new(),
        });

        let mut schemes = Vec::new();
        let mut authorizers = HashMap::new();
        for path in paths.iter().filter(|p| p.is_secured()) {
            if let Some(authentication) = path.authentication() {
                let resolved =
                    scheme::resolve(authentication, &self.schemes, self.token_provider.as_ref())?;
                tracing::debug!(path = %path.id(), scheme = authentication.kind(), "authentication scheme resolved");
                schemes.push((path.id().to_string(), resolved));
            }

            if let Some(authorization) = path.authorization() {
                let mut resolved = Vec::with_capacity(authorization.authorizers.len() + 1);
                for id in &authorization.authorizers {
                    let authorizer = self.authorizers.get(id).ok_or_else(|| {
                        SecurityError::Configuration(format!(
                            "no path authorizer registered with id [{id}]"
                        ))
                    })?;
                    resolved.push(Arc::clone(authorizer));
                }
                resolved.push(Arc::clone(&policy));
                authorizers.insert(path.id().to_string(), resolved);
            }
        }

        tracing::info!(
            paths = paths.len(),
            schemes = schemes.len(),
            permissive = self.permissive,
            "security filter initialized"
        );

        Ok(SecurityFilter {
            matcher: PathMatcher::new(paths),
            permissive: self.permissive,
            identity_manager: self.identity_manager,
            schemes,
            authorizers,
            audit: self.audit,
        })
    }
}
