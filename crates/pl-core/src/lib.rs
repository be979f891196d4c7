//! # pl-core
//!
//! Foundational types shared by every PicketLink Rust crate: runtime
//! configuration, the core error type, audit events and the tracing
//! subscriber bootstrap.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use event::{AuditEvent, AuditEventType, AuditHelper, AuditOutcome};
