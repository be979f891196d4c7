//! Accounts, credentials and the per-request identity.

use std::sync::Arc;

use async_trait::async_trait;
use pl_core::{AuditEvent, AuditEventType, AuditHelper};
use pl_session::{keys, HttpSession};
use serde::{Deserialize, Serialize};

use crate::error::SecurityResult;

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier.
    pub id: String,
    /// Name the user logs in with.
    pub login_name: String,
    /// Realm the account belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Group memberships.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Account {
    /// Creates an account with no roles or groups.
    #[must_use]
    pub fn new(id: impl Into<String>, login_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            login_name: login_name.into(),
            realm: None,
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Sets the realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Adds roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Adds groups.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Returns whether the account has a role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns whether the account is member of a group.
    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Parameters of an HTTP Digest `Authorization` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestCredentials {
    /// User name.
    pub username: String,
    /// Realm.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Digest URI.
    pub uri: String,
    /// Client response hash.
    pub response: String,
    /// Quality of protection.
    pub qop: Option<String>,
    /// Nonce count.
    pub nc: Option<String>,
    /// Client nonce.
    pub cnonce: Option<String>,
    /// Opaque value echoed back.
    pub opaque: Option<String>,
    /// Request method the digest was computed for.
    pub method: String,
}

/// Credentials extracted from a request by an authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// User name and password.
    Password {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// HTTP Digest response.
    Digest(DigestCredentials),
    /// Opaque bearer token.
    Token(String),
    /// Client certificate with the user name taken from its subject.
    X509 {
        /// User name derived from the certificate subject.
        username: String,
        /// DER certificate.
        certificate: Vec<u8>,
    },
}

impl Credentials {
    /// Returns the user the credentials claim to be, when known.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Password { username, .. } | Self::X509 { username, .. } => Some(username),
            Self::Digest(digest) => Some(&digest.username),
            Self::Token(_) => None,
        }
    }
}

/// Result of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
    /// The credentials were accepted.
    Success,
    /// The credentials were rejected.
    Failed,
}

/// Validates credentials against an identity store.
#[async_trait]
pub trait IdentityManager: Send + Sync {
    /// Returns the account the credentials belong to, or `None` when they
    /// are invalid.
    async fn authenticate(&self, credentials: &Credentials) -> SecurityResult<Option<Account>>;
}

/// The identity bound to one request.
///
/// Login state lives in the HTTP session so it survives across requests.
#[derive(Clone)]
pub struct Identity {
    session: Arc<HttpSession>,
    manager: Arc<dyn IdentityManager>,
    audit: Option<AuditHelper>,
}

impl Identity {
    /// Binds an identity to a session.
    #[must_use]
    pub fn new(session: Arc<HttpSession>, manager: Arc<dyn IdentityManager>) -> Self {
        Self {
            session,
            manager,
            audit: None,
        }
    }

    /// Records logins and logouts through `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditHelper) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Returns whether a user is logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.contains_attribute(keys::ACCOUNT)
    }

    /// Returns the logged-in account.
    pub fn account(&self) -> SecurityResult<Option<Account>> {
        Ok(self.session.attribute(keys::ACCOUNT)?)
    }

    /// Validates credentials and, on success, binds the account to the
    /// session.
    pub async fn login(&self, credentials: &Credentials) -> SecurityResult<AuthenticationStatus> {
        let Some(account) = self.manager.authenticate(credentials).await? else {
            tracing::debug!(user = ?credentials.user_id(), "credentials rejected");
            self.record(AuditEventType::LoginError, credentials.user_id());
            return Ok(AuthenticationStatus::Failed);
        };

        self.session.set_attribute(keys::ACCOUNT, &account)?;
        self.session
            .set_attribute(keys::PRINCIPAL_ID, &account.login_name)?;
        self.session.set_attribute(keys::ROLES, &account.roles)?;

        tracing::info!(user = %account.login_name, session = %self.session.id(), "user logged in");
        self.record(AuditEventType::Login, Some(&account.login_name));
        Ok(AuthenticationStatus::Success)
    }

    /// Drops every attribute bound to the session.
    pub fn logout(&self) {
        if let Ok(Some(account)) = self.account() {
            tracing::info!(user = %account.login_name, session = %self.session.id(), "user logged out");
            self.record(AuditEventType::Logout, Some(&account.login_name));
        }
        self.session.clear();
    }

    fn record(&self, event_type: AuditEventType, user: Option<&str>) {
        if let Some(audit) = &self.audit {
            audit.audit(&self.audit_event(event_type, user));
        }
    }

    fn audit_event(&self, event_type: AuditEventType, user: Option<&str>) -> AuditEvent {
        let mut builder = AuditEvent::builder(event_type).session(self.session.id());
        if let Some(user) = user {
            builder = builder.subject(user);
        }
        if event_type == AuditEventType::LoginError {
            builder = builder.failure("invalid credentials");
        }
        builder.build()
    }

    /// Returns the session the identity is bound to.
    #[must_use]
    pub fn session(&self) -> &Arc<HttpSession> {
        &self.session
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("session", &self.session.id())
            .field("logged_in", &self.is_logged_in())
            .finish()
    }
}
