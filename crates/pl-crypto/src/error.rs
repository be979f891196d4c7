//! Cryptographic error types.

use thiserror::Error;

/// Errors from signing, verification and certificate handling.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The signing operation failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The certificate could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
}
