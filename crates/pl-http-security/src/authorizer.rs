//! Path authorizers.

use std::sync::Arc;

use crate::error::SecurityResult;
use crate::exchange::HttpRequest;
use crate::identity::Account;
use crate::path::PathConfiguration;

/// Decides whether the current account may access a path.
pub trait PathAuthorizer: Send + Sync {
    /// Returns true to grant access.
    fn authorize(
        &self,
        path: &PathConfiguration,
        request: &HttpRequest,
        account: Option<&Account>,
    ) -> SecurityResult<bool>;
}

/// Evaluates authorization expressions such as `#{identity.account.id == 'john'}`.
pub trait ExpressionEvaluator: Send + Sync {
    /// Returns the boolean value of an expression.
    fn evaluate(
        &self,
        expression: &str,
        request: &HttpRequest,
        account: Option<&Account>,
    ) -> SecurityResult<bool>;
}

/// Default authorizer enforcing the roles, groups, realms and expressions of
/// a path's [`AuthorizationConfig`](crate::path::AuthorizationConfig).
#[derive(Clone, Default)]
pub struct PolicyAuthorizer {
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
}

impl PolicyAuthorizer {
    /// Creates an authorizer without expression support.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an authorizer that evaluates expressions with `evaluator`.
    #[must_use]
    pub fn with_evaluator(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator: Some(evaluator),
        }
    }
}

impl std::fmt::Debug for PolicyAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyAuthorizer")
            .field("expressions", &self.evaluator.is_some())
            .finish()
    }
}

impl PathAuthorizer for PolicyAuthorizer {
    fn authorize(
        &self,
        path: &PathConfiguration,
        request: &HttpRequest,
        account: Option<&Account>,
    ) -> SecurityResult<bool> {
        let Some(authz) = path.authorization() else {
            return Ok(true);
        };

        let Some(account) = account else {
            return Ok(authz.is_empty());
        };

        if !authz.roles.is_empty() && !authz.roles.iter().any(|role| account.has_role(role)) {
            tracing::debug!(user = %account.login_name, path = %path.uri(), "missing required role");
            return Ok(false);
        }

        if !authz.groups.is_empty() && !authz.groups.iter().any(|g| account.is_member_of(g)) {
            tracing::debug!(user = %account.login_name, path = %path.uri(), "missing required group");
            return Ok(false);
        }

        if !authz.realms.is_empty()
            && !account
                .realm
                .as_ref()
                .is_some_and(|realm| authz.realms.contains(realm))
        {
            tracing::debug!(user = %account.login_name, path = %path.uri(), "realm not allowed");
            return Ok(false);
        }

        if !authz.expressions.is_empty() {
            let Some(evaluator) = &self.evaluator else {
                tracing::warn!(
                    path = %path.uri(),
                    "path has authorization expressions but no evaluator is configured"
                );
                return Ok(false);
            };
            for expression in &authz.expressions {
                if !evaluator.evaluate(expression, request, Some(account))? {
                    tracing::debug!(user = %account.login_name, %expression, "expression denied access");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use pl_session::HttpSession;

    use super::*;

    struct OwnerOnly;

    impl ExpressionEvaluator for OwnerOnly {
        fn evaluate(
            &self,
            expression: &str,
            _request: &HttpRequest,
            account: Option<&Account>,
        ) -> SecurityResult<bool> {
            Ok(account.is_some_and(|a| expression.contains(&a.login_name)))
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, "/admin", Arc::new(HttpSession::new()))
    }

    #[test]
    fn roles_are_any_of() {
        let path = PathConfiguration::builder("/admin")
            .allowed_roles(["admin", "manager"])
            .build();
        let authorizer = PolicyAuthorizer::new();

        let manager = Account::new("1", "mary").with_roles(["manager"]);
        let clerk = Account::new("2", "carl").with_roles(["clerk"]);

        assert!(authorizer.authorize(&path, &request(), Some(&manager)).unwrap());
        assert!(!authorizer.authorize(&path, &request(), Some(&clerk)).unwrap());
        assert!(!authorizer.authorize(&path, &request(), None).unwrap());
    }

    #[test]
    fn groups_and_realms() {
        let path = PathConfiguration::builder("/reports")
            .allowed_groups(["finance"])
            .allowed_realms(["acme"])
            .build();
        let authorizer = PolicyAuthorizer::new();

        let member = Account::new("1", "fred")
            .with_groups(["finance"])
            .with_realm("acme");
        let outsider = Account::new("2", "olga")
            .with_groups(["finance"])
            .with_realm("other");

        assert!(authorizer.authorize(&path, &request(), Some(&member)).unwrap());
        assert!(!authorizer.authorize(&path, &request(), Some(&outsider)).unwrap());
    }

    #[test]
    fn expressions_need_an_evaluator() {
        let path = PathConfiguration::builder("/me")
            .expression("#{identity.account.loginName == 'john'}")
            .build();
        let john = Account::new("1", "john");

        assert!(!PolicyAuthorizer::new()
            .authorize(&path, &request(), Some(&john))
            .unwrap());
        assert!(PolicyAuthorizer::with_evaluator(Arc::new(OwnerOnly))
            .authorize(&path, &request(), Some(&john))
            .unwrap());
    }

    #[test]
    fn no_policy_grants() {
        let path = PathConfiguration::builder("/open").build();
        assert!(PolicyAuthorizer::new()
            .authorize(&path, &request(), None)
            .unwrap());
    }
}
