//! SAML 2.0 message model.
//!
//! Plain Rust values for the protocol messages the handler chain exchanges.
//! XML conversion lives in [`crate::writer`] and [`crate::parser`].

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod message;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use message::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

/// Generates a protocol message ID.
///
/// IDs must be valid XML `NCName`s, so they start with a letter.
#[must_use]
pub fn generate_id() -> String {
    format!("ID_{}", uuid::Uuid::new_v4())
}
