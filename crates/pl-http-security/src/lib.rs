//! # pl-http-security
//!
//! Path-based HTTP security for axum applications.
//!
//! A [`SecurityFilter`] resolves each request to the most specific
//! [`PathConfiguration`] through the [`PathMatcher`], runs the authentication
//! scheme bound to that path, enforces its authorization policy and finally
//! decides whether the request proceeds, is redirected or is rejected.
//!
//! ```rust,ignore
//! use pl_http_security::{AuthenticationConfig, PathConfiguration, SecurityFilter};
//!
//! let filter = SecurityFilter::builder(identity_manager)
//!     .path(
//!         PathConfiguration::builder("/admin/*")
//!             .authentication(AuthenticationConfig::basic())
//!             .allowed_roles(["admin"])
//!             .build(),
//!     )
//!     .build()?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authorizer;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod identity;
pub mod layer;
pub mod matcher;
pub mod path;
pub mod scheme;

pub use authorizer::{ExpressionEvaluator, PathAuthorizer, PolicyAuthorizer};
pub use error::{SecurityError, SecurityResult};
pub use exchange::{FilterOutcome, HttpRequest, HttpResponse};
pub use filter::{SecurityFilter, SecurityFilterBuilder};
pub use identity::{
    Account, AuthenticationStatus, Credentials, DigestCredentials, Identity, IdentityManager,
};
pub use layer::{security_layer, ClientCertificate, SecurityState, SESSION_COOKIE};
pub use matcher::PathMatcher;
pub use path::{AuthenticationConfig, AuthorizationConfig, Outcome, PathConfiguration};
pub use scheme::{
    BasicAuthenticationScheme, DigestAuthenticationScheme, FormAuthenticationScheme,
    HttpAuthenticationScheme, TokenAuthenticationScheme, TokenProvider, X509AuthenticationScheme,
};
