//! End-to-end integration tests.
//!
//! Everything runs in-process: the security filter is driven through an
//! axum router with `tower::ServiceExt::oneshot`, and SAML messages travel
//! between the IDP and SP chains as the HTML forms and redirect URLs a
//! browser would carry.

mod common;
mod saml_logout;
mod saml_sso;
mod security_filter;
