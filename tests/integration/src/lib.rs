//! End-to-end tests for the PicketLink crates.
//!
//! The suites live under `tests/`: the HTTP security filter mounted on an
//! axum router, and SAML browser SSO and single logout run between real
//! IDP and SP handler chains over the HTTP bindings.

#![forbid(unsafe_code)]
