//! Tracks the service providers each IDP session has issued assertions to.
//!
//! Single logout walks this stack: every participant gets a `LogoutRequest`
//! before the originator is told the logout succeeded. A participant whose
//! request is outstanding is "in transit" until its `LogoutResponse` comes
//! back.

use std::collections::HashSet;

use dashmap::DashMap;

/// The participant stack operations the logout handler relies on.
///
/// Calls for different sessions may run concurrently; calls for one
/// session are serialized by the implementation.
pub trait IdentityParticipantStack: Send + Sync {
    /// Returns the most recently registered participant.
    fn peek(&self, session_id: &str) -> Option<String>;

    /// Removes and returns the most recently registered participant.
    fn pop(&self, session_id: &str) -> Option<String>;

    /// Registers a participant with the binding it was reached over.
    /// Registering an existing participant again is a no-op.
    fn register(&self, session_id: &str, participant: &str, post_binding: bool);

    /// Number of participants still on the stack.
    fn participants(&self, session_id: &str) -> usize;

    /// Marks a participant as having an outstanding logout request.
    fn register_transit_participant(&self, session_id: &str, participant: &str) -> bool;

    /// Clears the in-transit mark of a participant.
    fn deregister_transit_participant(&self, session_id: &str, participant: &str) -> bool;

    /// Number of participants with an outstanding logout request.
    fn participants_in_transit(&self, session_id: &str) -> usize;

    /// Binding recorded for a participant: `Some(true)` for HTTP-POST.
    fn binding(&self, participant: &str) -> Option<bool>;

    /// Number of sessions currently tracked.
    fn total_sessions(&self) -> usize;

    /// Starts tracking a session.
    fn create_session(&self, session_id: &str);

    /// Stops tracking a session.
    fn remove_session(&self, session_id: &str);
}

#[derive(Debug, Default)]
struct SessionParticipants {
    stack: Vec<String>,
    in_transit: HashSet<String>,
}

/// In-memory [`IdentityParticipantStack`].
#[derive(Debug, Default)]
pub struct IdentityServer {
    sessions: DashMap<String, SessionParticipants>,
    bindings: DashMap<String, bool>,
}

impl IdentityServer {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one participant left.
    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.stack.is_empty())
            .count()
    }
}

impl IdentityParticipantStack for IdentityServer {
    fn peek(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get(session_id)
            .and_then(|entry| entry.stack.last().cloned())
    }

    fn pop(&self, session_id: &str) -> Option<String> {
        self.sessions
            .get_mut(session_id)
            .and_then(|mut entry| entry.stack.pop())
    }

    fn register(&self, session_id: &str, participant: &str, post_binding: bool) {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        if entry.stack.iter().any(|p| p == participant) {
            return;
        }
        entry.stack.push(participant.to_string());
        self.bindings.insert(participant.to_string(), post_binding);
        tracing::debug!(session = %session_id, participant, post_binding, "participant registered");
    }

    fn participants(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, |entry| entry.stack.len())
    }

    fn register_transit_participant(&self, session_id: &str, participant: &str) -> bool {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .in_transit
            .insert(participant.to_string())
    }

    fn deregister_transit_participant(&self, session_id: &str, participant: &str) -> bool {
        self.bindings.remove(participant);
        self.sessions
            .get_mut(session_id)
            .is_some_and(|mut entry| entry.in_transit.remove(participant))
    }

    fn participants_in_transit(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, |entry| entry.in_transit.len())
    }

    fn binding(&self, participant: &str) -> Option<bool> {
        self.bindings.get(participant).map(|entry| *entry)
    }

    fn total_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn create_session(&self, session_id: &str) {
        self.sessions.entry(session_id.to_string()).or_default();
    }

    fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_last_in_first_out() {
        let server = IdentityServer::new();
        server.register("s1", "https://sp1.example.com", true);
        server.register("s1", "https://sp2.example.com", false);

        assert_eq!(server.participants("s1"), 2);
        assert_eq!(server.peek("s1").as_deref(), Some("https://sp2.example.com"));
        assert_eq!(server.pop("s1").as_deref(), Some("https://sp2.example.com"));
        assert_eq!(server.pop("s1").as_deref(), Some("https://sp1.example.com"));
        assert_eq!(server.pop("s1"), None);
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let server = IdentityServer::new();
        server.register("s1", "https://sp1.example.com", true);
        server.register("s1", "https://sp1.example.com", false);

        assert_eq!(server.participants("s1"), 1);
        assert_eq!(server.binding("https://sp1.example.com"), Some(true));
    }

    #[test]
    fn sessions_are_isolated() {
        let server = IdentityServer::new();
        server.register("s1", "https://sp1.example.com", true);
        server.register("s2", "https://sp2.example.com", true);

        assert_eq!(server.total_sessions(), 2);
        assert_eq!(server.pop("s1").as_deref(), Some("https://sp1.example.com"));
        assert_eq!(server.participants("s2"), 1);
        assert_eq!(server.active_session_count(), 1);

        server.remove_session("s2");
        assert_eq!(server.total_sessions(), 1);
    }

    #[test]
    fn transit_tracking_clears_binding() {
        let server = IdentityServer::new();
        server.register("s1", "https://sp1.example.com", false);

        assert!(server.register_transit_participant("s1", "https://sp1.example.com"));
        assert!(!server.register_transit_participant("s1", "https://sp1.example.com"));
        assert_eq!(server.participants_in_transit("s1"), 1);

        assert!(server.deregister_transit_participant("s1", "https://sp1.example.com"));
        assert_eq!(server.participants_in_transit("s1"), 0);
        assert_eq!(server.binding("https://sp1.example.com"), None);
    }

    #[test]
    fn unknown_session_is_empty() {
        let server = IdentityServer::new();
        server.create_session("s1");

        assert_eq!(server.peek("s1"), None);
        assert_eq!(server.participants("missing"), 0);
        assert!(!server.deregister_transit_participant("missing", "x"));
    }
}
