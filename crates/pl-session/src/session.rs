//! A single HTTP session.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// A server-side HTTP session.
///
/// Attributes are stored as JSON values so any serde type can be kept without
/// the session knowing about it. Reads and writes take a short lock; callers
/// hold no lock across awaits or handler invocations.
#[derive(Debug)]
pub struct HttpSession {
    /// Unique session identifier.
    id: String,

    /// Session attributes.
    attributes: RwLock<HashMap<String, Value>>,

    /// Whether this session has been invalidated.
    invalidated: RwLock<bool>,

    /// Last time the session was looked up by a request.
    last_activity: RwLock<DateTime<Utc>>,
}

impl HttpSession {
    /// Creates a new session with a random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string())
    }

    /// Creates a session with a known identifier.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: RwLock::new(HashMap::new()),
            invalidated: RwLock::new(false),
            last_activity: RwLock::new(Utc::now()),
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stores an attribute, replacing any previous value.
    pub fn set_attribute<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SessionResult<()> {
        if self.is_invalidated() {
            return Err(SessionError::Invalidated(self.id.clone()));
        }
        let value = serde_json::to_value(value).map_err(|source| SessionError::Attribute {
            key: key.to_string(),
            source,
        })?;
        self.attributes.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Reads an attribute, converting it to `T`.
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        let value = self.attributes.read().get(key).cloned();
        value.map(|v| convert(key, v)).transpose()
    }

    /// Reads a string attribute, ignoring values of any other type.
    #[must_use]
    pub fn string_attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .read()
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Returns whether an attribute is present.
    #[must_use]
    pub fn contains_attribute(&self, key: &str) -> bool {
        self.attributes.read().contains_key(key)
    }

    /// Removes an attribute, returning its raw value.
    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes.write().remove(key)
    }

    /// Removes an attribute and converts it to `T`.
    pub fn take_attribute<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        self.remove_attribute(key)
            .map(|v| convert(key, v))
            .transpose()
    }

    /// Returns the attribute names currently set.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.read().keys().cloned().collect()
    }

    /// Removes every attribute but keeps the session usable.
    pub fn clear(&self) {
        self.attributes.write().clear();
    }

    /// Invalidates the session.
    ///
    /// All attributes are dropped and later writes fail.
    pub fn invalidate(&self) {
        self.attributes.write().clear();
        *self.invalidated.write() = true;
        tracing::debug!(session = %self.id, "session invalidated");
    }

    /// Returns whether the session has been invalidated.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        *self.invalidated.read()
    }

    /// Records activity on the session.
    pub fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    /// Returns the last recorded activity.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    /// Returns whether the session has been idle longer than `max_inactive`.
    #[must_use]
    pub fn is_expired(&self, max_inactive: Duration) -> bool {
        Utc::now() - self.last_activity() > max_inactive
    }
}

impl Default for HttpSession {
    fn default() -> Self {
        Self::new()
    }
}

fn convert<T: DeserializeOwned>(key: &str, value: Value) -> SessionResult<T> {
    serde_json::from_value(value).map_err(|source| SessionError::Attribute {
        key: key.to_string(),
        source,
    })
}
