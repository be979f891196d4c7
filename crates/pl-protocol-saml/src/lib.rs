//! # pl-protocol-saml
//!
//! SAML 2.0 web browser SSO and single logout for PicketLink.
//!
//! - [`types`]: the protocol messages and assertions
//! - [`writer`] and [`parser`]: XML conversion built on `quick-xml`
//! - [`bindings`]: HTTP-POST and HTTP-Redirect encodings
//! - [`signature`]: enveloped XML signatures and redirect query signatures
//! - [`handlers`]: the ordered handler chain run for every exchange, for
//!   both the identity provider and the service provider side
//! - [`identity_server`]: the per-session participant stack single logout
//!   walks
//! - [`sts`]: the token service assertions are cancelled against
//!
//! ```rust,ignore
//! use pl_protocol_saml::handlers::{
//!     AuthenticationHandler, ChainConfig, HandlerConfig, IdpConfig, SamlHandlerChain,
//! };
//!
//! let config = Arc::new(
//!     ChainConfig::idp(IdpConfig::new("https://idp.example.com/"))
//!         .with_identity_server(Arc::new(IdentityServer::new())),
//! );
//! let chain = SamlHandlerChain::new(config.clone())
//!     .with(AuthenticationHandler::new(config, HandlerConfig::default())?);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bindings;
pub mod error;
pub mod handlers;
pub mod identity_server;
pub mod parser;
pub mod signature;
pub mod sts;
pub mod types;
pub mod writer;

pub use error::{SamlError, SamlResult};
pub use identity_server::{IdentityParticipantStack, IdentityServer};
pub use sts::{LocalTokenService, SecurityTokenService};
pub use types::*;
