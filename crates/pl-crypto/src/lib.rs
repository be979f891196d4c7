//! # pl-crypto
//!
//! Cryptographic primitives used by the SAML signature handlers, backed by
//! aws-lc-rs. SAML 2.0 deployments still rely on RSA PKCS#1 v1.5 with
//! SHA-256, so that family is the one offered here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod hash;
pub mod rsa;
pub mod x509;

pub use error::CryptoError;
pub use hash::{digest, sha256, sha384, sha512, HashAlgorithm};
pub use rsa::{rsa_sign, rsa_verify, RsaAlgorithm};
pub use x509::{public_key_from_certificate, subject_common_name};
