//! Audit events for federation decisions.
//!
//! Every event carries a timestamp, the event type, the outcome, the party
//! doing the auditing and, when known, the subject, the peer destination and
//! the session it belongs to. Events are emitted through `tracing` under the
//! `picketlink::audit` target so any subscriber can route them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// A principal was authenticated.
    Login,
    /// Authentication failed.
    LoginError,
    /// A principal logged out.
    Logout,
    /// An HTTP session was invalidated after single logout.
    InvalidateHttpSession,
    /// The IDP sent a response to a service provider.
    ResponseToSp,
    /// The SP received a response from the IDP.
    RequestFromIdp,
    /// An issuer was rejected by the trusted domain list.
    ErrorTrustedDomain,
    /// A signature failed validation.
    ErrorSignatureValidation,
    /// The IDP could not build a response for a service provider.
    ErrorResponseToSp,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A security event for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Outcome of the event.
    pub outcome: AuditOutcome,
    /// Entity or context path recording the event.
    pub who_is_auditing: Option<String>,
    /// Principal the event concerns.
    pub subject: Option<String>,
    /// Peer the message was sent to or received from.
    pub destination: Option<String>,
    /// Session identifier.
    pub session_id: Option<String>,
    /// Error message (for failure events).
    pub error: Option<String>,
    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl AuditEvent {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: AuditEventType) -> AuditEventBuilder {
        AuditEventBuilder::new(event_type)
    }
}

/// Builder for audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event_type: AuditEventType,
    outcome: AuditOutcome,
    who_is_auditing: Option<String>,
    subject: Option<String>,
    destination: Option<String>,
    session_id: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl AuditEventBuilder {
    /// Creates a new builder with a success outcome.
    #[must_use]
    pub const fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            outcome: AuditOutcome::Success,
            who_is_auditing: None,
            subject: None,
            destination: None,
            session_id: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the auditing party.
    #[must_use]
    pub fn who_is_auditing(mut self, who: impl Into<String>) -> Self {
        self.who_is_auditing = Some(who.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the destination.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Sets the session ID.
    #[must_use]
    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            who_is_auditing: self.who_is_auditing,
            subject: self.subject,
            destination: self.destination,
            session_id: self.session_id,
            error: self.error,
            details: self.details,
        }
    }
}

/// Emits audit events for one security domain.
#[derive(Debug, Clone)]
pub struct AuditHelper {
    security_domain: String,
}

impl AuditHelper {
    /// Creates a helper auditing on behalf of `security_domain`.
    #[must_use]
    pub fn new(security_domain: impl Into<String>) -> Self {
        Self {
            security_domain: security_domain.into(),
        }
    }

    /// Returns the security domain.
    #[must_use]
    pub fn security_domain(&self) -> &str {
        &self.security_domain
    }

    /// Records an event.
    pub fn audit(&self, event: &AuditEvent) {
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "picketlink::audit",
                security_domain = %self.security_domain,
                event_id = %event.id,
                event_type = ?event.event_type,
                who = event.who_is_auditing.as_deref().unwrap_or("-"),
                subject = event.subject.as_deref().unwrap_or("-"),
                destination = event.destination.as_deref().unwrap_or("-"),
                session = event.session_id.as_deref().unwrap_or("-"),
                "audit"
            ),
            AuditOutcome::Failure => tracing::warn!(
                target: "picketlink::audit",
                security_domain = %self.security_domain,
                event_id = %event.id,
                event_type = ?event.event_type,
                who = event.who_is_auditing.as_deref().unwrap_or("-"),
                subject = event.subject.as_deref().unwrap_or("-"),
                destination = event.destination.as_deref().unwrap_or("-"),
                session = event.session_id.as_deref().unwrap_or("-"),
                error = event.error.as_deref().unwrap_or("-"),
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_creates_success_event() {
        let event = AuditEvent::builder(AuditEventType::ResponseToSp)
            .who_is_auditing("/idp")
            .destination("https://sp.example.com/acs")
            .subject("alice")
            .build();

        assert_eq!(event.event_type, AuditEventType::ResponseToSp);
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.destination.as_deref(), Some("https://sp.example.com/acs"));
        assert!(event.error.is_none());
    }

    #[test]
    fn builder_creates_failure_event() {
        let event = AuditEvent::builder(AuditEventType::ErrorTrustedDomain)
            .failure("evil.example.org is not trusted")
            .detail("issuer", "https://evil.example.org/sp")
            .build();

        assert_eq!(event.outcome, AuditOutcome::Failure);
        assert_eq!(event.details.len(), 1);
    }

    #[test]
    fn event_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&AuditEventType::InvalidateHttpSession).unwrap();
        assert_eq!(json, "\"INVALIDATE_HTTP_SESSION\"");
    }

    #[test]
    fn helper_audits_without_subscriber() {
        let helper = AuditHelper::new("picketlink-idp");
        helper.audit(&AuditEvent::builder(AuditEventType::Logout).build());
        assert_eq!(helper.security_domain(), "picketlink-idp");
    }
}
