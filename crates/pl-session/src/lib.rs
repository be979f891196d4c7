//! # pl-session
//!
//! Server-side HTTP session state.
//!
//! The session is the only state that survives between the round trips of a
//! federated exchange: the authenticated principal, its roles, the SAML
//! assertion, the outstanding `AuthnRequest` ID and the original target path
//! all live here under the names in [`keys`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod keys;
mod session;
mod store;

pub use error::{SessionError, SessionResult};
pub use session::HttpSession;
pub use store::{SessionStore, DEFAULT_MAX_INACTIVE_SECS};
