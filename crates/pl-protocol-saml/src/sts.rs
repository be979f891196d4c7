//! Security token service client.
//!
//! The IDP cancels the assertion issued for a session once single logout
//! completes. The service itself is external; [`LocalTokenService`] keeps
//! the revocations in memory.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;

use crate::error::SamlResult;
use crate::types::Assertion;

/// Security token service used to revoke issued assertions.
#[async_trait]
pub trait SecurityTokenService: Send + Sync {
    /// Cancels a previously issued assertion.
    async fn cancel_token(&self, assertion: &Assertion) -> SamlResult<()>;

    /// Lifetime of tokens issued by this service.
    ///
    /// Also used as the validity of outbound logout requests.
    fn issued_token_timeout(&self) -> Duration;
}

/// In-memory token service that records cancelled assertion IDs.
#[derive(Debug, Default)]
pub struct LocalTokenService {
    timeout: Duration,
    revoked: DashSet<String>,
}

impl LocalTokenService {
    /// Creates a service issuing tokens with the given lifetime.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            revoked: DashSet::new(),
        }
    }

    /// Returns whether the assertion with this ID was cancelled.
    #[must_use]
    pub fn is_revoked(&self, assertion_id: &str) -> bool {
        self.revoked.contains(assertion_id)
    }
}

#[async_trait]
impl SecurityTokenService for LocalTokenService {
    async fn cancel_token(&self, assertion: &Assertion) -> SamlResult<()> {
        tracing::debug!(assertion_id = %assertion.id, "cancelling token");
        self.revoked.insert(assertion.id.clone());
        Ok(())
    }

    fn issued_token_timeout(&self) -> Duration {
        self.timeout
    }
}
