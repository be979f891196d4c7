//! Concurrent session registry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::session::HttpSession;

/// Idle time after which a session is dropped, unless configured otherwise.
pub const DEFAULT_MAX_INACTIVE_SECS: i64 = 30 * 60;

/// Minimum spacing between the sweeps triggered by session creation.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Thread-safe registry of live sessions keyed by session ID.
///
/// Sessions idle for longer than the max-inactive interval are treated as
/// absent. Creating a session sweeps the registry at most once per minute,
/// so sessions abandoned by anonymous clients do not accumulate.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<HttpSession>>,
    max_inactive: Duration,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            max_inactive: Duration::seconds(DEFAULT_MAX_INACTIVE_SECS),
            last_sweep: Mutex::new(Utc::now()),
        }
    }
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle time after which sessions expire.
    #[must_use]
    pub fn with_max_inactive(mut self, max_inactive: Duration) -> Self {
        self.max_inactive = max_inactive;
        self
    }

    /// Returns the idle time after which sessions expire.
    #[must_use]
    pub fn max_inactive(&self) -> Duration {
        self.max_inactive
    }

    /// Creates and registers a new session.
    pub fn create(&self) -> Arc<HttpSession> {
        self.sweep_if_due();

        let session = Arc::new(HttpSession::new());
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        tracing::debug!(session = %session.id(), "session created");
        session
    }

    /// Looks up a live session and records the access.
    ///
    /// Invalidated and expired sessions are evicted and reported as absent.
    pub fn get(&self, id: &str) -> Option<Arc<HttpSession>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        if session.is_invalidated() || session.is_expired(self.max_inactive) {
            self.sessions.remove(id);
            tracing::debug!(session = %id, "stale session evicted");
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Returns the live session with `id`, or a fresh one.
    pub fn get_or_create(&self, id: Option<&str>) -> Arc<HttpSession> {
        id.and_then(|id| self.get(id))
            .unwrap_or_else(|| self.create())
    }

    /// Removes a session.
    pub fn remove(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Drops every invalidated or expired session.
    ///
    /// Returns the number of sessions removed.
    pub fn purge(&self) -> usize {
        let before = self.sessions.len();
        let max_inactive = self.max_inactive;
        self.sessions
            .retain(|_, session| !session.is_invalidated() && !session.is_expired(max_inactive));
        *self.last_sweep.lock() = Utc::now();

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.sessions.len(), "sessions purged");
        }
        removed
    }

    fn sweep_if_due(&self) {
        let due = Utc::now() - *self.last_sweep.lock() >= Duration::seconds(SWEEP_INTERVAL_SECS);
        if due {
            self.purge();
        }
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_sessions_can_be_found() {
        let store = SessionStore::new();
        let session = store.create();

        let found = store.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalidated_sessions_are_evicted() {
        let store = SessionStore::new();
        let session = store.create();
        session.invalidate();

        assert!(store.get(session.id()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn get_or_create_replaces_unknown_ids() {
        let store = SessionStore::new();
        let first = store.get_or_create(Some("missing"));
        let again = store.get_or_create(Some(first.id()));

        assert_ne!(first.id(), "missing");
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::new().with_max_inactive(Duration::seconds(-1));
        let session = store.create();

        assert!(store.get(session.id()).is_none());
        assert!(store.is_empty());

        let replacement = store.get_or_create(Some(session.id()));
        assert_ne!(replacement.id(), session.id());
    }

    #[test]
    fn purge_drops_invalidated_and_expired() {
        let store = SessionStore::new();
        let live = store.create();
        store.create().invalidate();
        assert_eq!(store.purge(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(live.id()).is_some());

        let idle = SessionStore::new().with_max_inactive(Duration::seconds(-1));
        for _ in 0..3 {
            idle.create();
        }
        assert_eq!(idle.purge(), 3);
        assert!(idle.is_empty());
    }

    #[test]
    fn creation_sweeps_abandoned_sessions() {
        let store = SessionStore::new().with_max_inactive(Duration::seconds(-1));
        store.create();
        store.create();
        *store.last_sweep.lock() = Utc::now() - Duration::seconds(SWEEP_INTERVAL_SECS + 1);

        let fresh = store.create();
        assert_eq!(store.len(), 1);
        assert!(store.sessions.contains_key(fresh.id()));
    }
}
