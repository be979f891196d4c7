//! Runtime configuration.
//!
//! Configuration is loaded from `PL_*` environment variables (optionally via a
//! `.env` file) with defaults matching a restrictive deployment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP security filter settings.
    pub security: SecurityConfig,
    /// SAML protocol settings.
    pub saml: SamlConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP security filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// When true, requests that match no configured path are let through.
    /// When false, they are rejected with 403.
    pub permissive: bool,
    /// Idle time, in seconds, after which an HTTP session expires.
    pub session_max_inactive_secs: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permissive: false,
            session_max_inactive_secs: 1800,
        }
    }
}

/// SAML protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlConfig {
    /// Lifetime of issued logout requests, in milliseconds.
    pub sts_token_timeout_ms: u64,
    /// Forces HTTP-POST binding for every outbound logout message.
    pub strict_post_binding: bool,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            sts_token_timeout_ms: 5000,
            strict_post_binding: false,
        }
    }
}

impl SamlConfig {
    /// Returns the token timeout as a duration.
    #[must_use]
    pub const fn sts_token_timeout(&self) -> Duration {
        Duration::from_millis(self.sts_token_timeout_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> CoreResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults; malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("PL_SECURITY_PERMISSIVE") {
            config.security.permissive = parse_bool("PL_SECURITY_PERMISSIVE", &value)?;
        }

        if let Some(value) = lookup("PL_SESSION_MAX_INACTIVE_SECS") {
            config.security.session_max_inactive_secs = value.trim().parse().map_err(|_| {
                CoreError::Config(format!(
                    "PL_SESSION_MAX_INACTIVE_SECS must be a number of seconds, got '{value}'"
                ))
            })?;
        }

        if let Some(value) = lookup("PL_SAML_STS_TOKEN_TIMEOUT_MS") {
            config.saml.sts_token_timeout_ms = value.trim().parse().map_err(|_| {
                CoreError::Config(format!(
                    "PL_SAML_STS_TOKEN_TIMEOUT_MS must be a number of milliseconds, got '{value}'"
                ))
            })?;
        }

        if let Some(value) = lookup("PL_SAML_STRICT_POST_BINDING") {
            config.saml.strict_post_binding = parse_bool("PL_SAML_STRICT_POST_BINDING", &value)?;
        }

        if let Some(value) = lookup("PL_LOG_LEVEL") {
            config.logging.level = value;
        }

        if let Some(value) = lookup("PL_LOG_JSON") {
            config.logging.json = parse_bool("PL_LOG_JSON", &value)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> CoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_restrictive() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(!config.security.permissive);
        assert_eq!(config.security.session_max_inactive_secs, 1800);
        assert_eq!(config.saml.sts_token_timeout(), Duration::from_millis(5000));
        assert!(!config.saml.strict_post_binding);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("PL_SECURITY_PERMISSIVE", "true"),
            ("PL_SESSION_MAX_INACTIVE_SECS", "600"),
            ("PL_SAML_STS_TOKEN_TIMEOUT_MS", "120000"),
            ("PL_SAML_STRICT_POST_BINDING", "1"),
            ("PL_LOG_LEVEL", "debug"),
            ("PL_LOG_JSON", "yes"),
        ]))
        .unwrap();

        assert!(config.security.permissive);
        assert_eq!(config.security.session_max_inactive_secs, 600);
        assert_eq!(config.saml.sts_token_timeout_ms, 120_000);
        assert!(config.saml.strict_post_binding);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("PL_SECURITY_PERMISSIVE", "maybe")])).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));

        let err =
            Config::from_lookup(lookup(&[("PL_SAML_STS_TOKEN_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("PL_SAML_STS_TOKEN_TIMEOUT_MS"));
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: Config =
            serde_json::from_str(r#"{"security":{"permissive":true}}"#).unwrap();
        assert!(config.security.permissive);
        assert_eq!(config.saml, SamlConfig::default());
    }
}
