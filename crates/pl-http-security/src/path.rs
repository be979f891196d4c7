//! Path configurations.
//!
//! A [`PathConfiguration`] is the security policy for one URI pattern. It is
//! assembled once through [`PathConfigurationBuilder`] and read-only after the
//! filter is built.

use std::collections::{HashMap, HashSet};

use axum::http::Method;

/// Realm used by the Basic and Digest schemes when none is configured.
pub const DEFAULT_REALM: &str = "PicketLink Default Realm";

/// Outcome keys of the redirect table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The request was processed successfully.
    Ok,
    /// Access was denied.
    Forbidden,
    /// Any other failure.
    Error,
}

/// How requests to a path are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationConfig {
    /// HTTP Basic.
    Basic {
        /// Realm announced in the challenge.
        realm: String,
    },
    /// HTTP Digest.
    Digest {
        /// Realm announced in the challenge.
        realm: String,
    },
    /// HTML form posting to `j_security_check`.
    Form {
        /// Login page, relative to the context path.
        login_page: String,
        /// Page shown when the login fails.
        error_page: String,
        /// Redirect back to the page asked for before the challenge.
        restore_original_request: bool,
    },
    /// Token issued after a Basic login.
    Token,
    /// TLS client certificate.
    X509 {
        /// Regex whose first group extracts the user name from the subject DN.
        subject_regex: Option<String>,
    },
    /// Scheme registered on the filter builder under this id.
    Custom {
        /// Registered scheme id.
        scheme_id: String,
    },
}

impl AuthenticationConfig {
    /// Basic authentication in the default realm.
    #[must_use]
    pub fn basic() -> Self {
        Self::Basic {
            realm: DEFAULT_REALM.to_string(),
        }
    }

    /// Digest authentication in the default realm.
    #[must_use]
    pub fn digest() -> Self {
        Self::Digest {
            realm: DEFAULT_REALM.to_string(),
        }
    }

    /// Form authentication with the usual page names.
    #[must_use]
    pub fn form() -> Self {
        Self::Form {
            login_page: "/login.html".to_string(),
            error_page: "/loginError.html".to_string(),
            restore_original_request: true,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Digest { .. } => "digest",
            Self::Form { .. } => "form",
            Self::Token => "token",
            Self::X509 { .. } => "x509",
            Self::Custom { scheme_id } => scheme_id,
        }
    }
}

/// Authorization policy for a path.
///
/// Each non-empty list is a separate check; all checks must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationConfig {
    /// The account needs at least one of these roles.
    pub roles: Vec<String>,
    /// The account must belong to at least one of these groups.
    pub groups: Vec<String>,
    /// The account's realm must be one of these.
    pub realms: Vec<String>,
    /// Expressions that must all evaluate to true.
    pub expressions: Vec<String>,
    /// Ids of custom authorizers registered on the filter builder.
    pub authorizers: Vec<String>,
}

impl AuthorizationConfig {
    /// Returns true when the configuration contains no check at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
            && self.groups.is_empty()
            && self.realms.is_empty()
            && self.expressions.is_empty()
            && self.authorizers.is_empty()
    }
}

/// Security policy for one URI pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfiguration {
    id: String,
    uri: String,
    methods: HashSet<Method>,
    secured: bool,
    authentication: Option<AuthenticationConfig>,
    authorization: Option<AuthorizationConfig>,
    logout: bool,
    redirects: HashMap<Outcome, String>,
    headers: Vec<(String, String)>,
}

impl PathConfiguration {
    /// Starts a configuration for a URI pattern.
    ///
    /// Patterns may be exact (`/admin`), prefix wildcards (`/admin/*`), suffix
    /// wildcards (`/*.jsp`), templates (`/users/{id}`) or the catch-all `/*`.
    #[must_use]
    pub fn builder(uri: impl Into<String>) -> PathConfigurationBuilder {
        PathConfigurationBuilder::new(uri.into())
    }

    /// Unique id, assigned when the filter is built.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// URI pattern.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Allowed methods.
    #[must_use]
    pub const fn methods(&self) -> &HashSet<Method> {
        &self.methods
    }

    /// Returns whether `method` may be used on this path.
    #[must_use]
    pub fn is_method_allowed(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Returns whether the path is protected.
    #[must_use]
    pub const fn is_secured(&self) -> bool {
        self.secured
    }

    /// Authentication configuration, if any.
    #[must_use]
    pub const fn authentication(&self) -> Option<&AuthenticationConfig> {
        self.authentication.as_ref()
    }

    /// Authorization configuration, if any.
    #[must_use]
    pub const fn authorization(&self) -> Option<&AuthorizationConfig> {
        self.authorization.as_ref()
    }

    /// Returns whether requests to this path log the user out.
    #[must_use]
    pub const fn is_logout(&self) -> bool {
        self.logout
    }

    /// Redirect URL for an outcome.
    #[must_use]
    pub fn redirect(&self, outcome: Outcome) -> Option<&str> {
        self.redirects.get(&outcome).map(String::as_str)
    }

    /// Inbound headers this configuration is restricted to.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Builder for [`PathConfiguration`].
#[derive(Debug)]
#[must_use]
pub struct PathConfigurationBuilder {
    config: PathConfiguration,
}

impl PathConfigurationBuilder {
    fn new(uri: String) -> Self {
        let methods = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
            Method::PATCH,
            Method::TRACE,
        ]
        .into_iter()
        .collect();

        Self {
            config: PathConfiguration {
                id: uri.clone(),
                uri,
                methods,
                secured: true,
                authentication: None,
                authorization: None,
                logout: false,
                redirects: HashMap::new(),
                headers: Vec::new(),
            },
        }
    }

    /// Restricts the allowed methods.
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.config.methods = methods.into_iter().collect();
        self
    }

    /// Marks the path as unprotected.
    pub fn unprotected(mut self) -> Self {
        self.config.secured = false;
        self
    }

    /// Sets the authentication scheme.
    pub fn authentication(mut self, authentication: AuthenticationConfig) -> Self {
        self.config.authentication = Some(authentication);
        self
    }

    /// Sets the whole authorization policy.
    pub fn authorization(mut self, authorization: AuthorizationConfig) -> Self {
        self.config.authorization = Some(authorization);
        self
    }

    /// Requires one of the given roles.
    pub fn allowed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authz()
            .roles
            .extend(roles.into_iter().map(Into::into));
        self
    }

    /// Requires membership of one of the given groups.
    pub fn allowed_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authz()
            .groups
            .extend(groups.into_iter().map(Into::into));
        self
    }

    /// Requires one of the given realms.
    pub fn allowed_realms<I, S>(mut self, realms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authz()
            .realms
            .extend(realms.into_iter().map(Into::into));
        self
    }

    /// Requires an expression to evaluate to true.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.authz().expressions.push(expression.into());
        self
    }

    /// Adds a custom authorizer by id.
    pub fn authorizer(mut self, id: impl Into<String>) -> Self {
        self.authz().authorizers.push(id.into());
        self
    }

    /// Marks the path as the logout path.
    pub fn logout(mut self) -> Self {
        self.config.logout = true;
        self
    }

    /// Sets the redirect URL for an outcome.
    pub fn redirect_to(mut self, outcome: Outcome, url: impl Into<String>) -> Self {
        self.config.redirects.insert(outcome, url.into());
        self
    }

    /// Restricts the configuration to requests carrying a header value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    fn authz(&mut self) -> &mut AuthorizationConfig {
        self.config
            .authorization
            .get_or_insert_with(AuthorizationConfig::default)
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> PathConfiguration {
        self.config
    }
}
