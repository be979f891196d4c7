//! SAML error types.
//!
//! Protocol failures raised by handlers are reported as [`SamlError::Processing`],
//! optionally wrapping the specific cause (an untrusted issuer, a bad
//! signature, an expired assertion, an `InResponseTo` mismatch). The chain
//! driver turns the first error into an HTTP status on the handler response.

use pl_session::SessionError;
use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML protocol errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A handler could not complete the exchange.
    #[error("processing error: {message}")]
    Processing {
        /// What went wrong.
        message: String,
        /// The underlying cause, when there is one.
        #[source]
        source: Option<Box<SamlError>>,
    },

    /// The message issuer is not in the trusted domain list.
    #[error("issuer not trusted: {0}")]
    IssuerNotTrusted(String),

    /// XML or redirect-binding signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureValidation(String),

    /// Creating a signature failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// The assertion is outside its validity window.
    #[error("assertion has expired")]
    AssertionExpired,

    /// The response does not answer the request recorded in the session.
    #[error("InResponseTo verification failed: expected {expected:?}, got {actual:?}")]
    InResponseToMismatch {
        /// The request ID stored in the session.
        expected: Option<String>,
        /// The `InResponseTo` value carried by the response.
        actual: Option<String>,
    },

    /// Invalid or missing handler or chain configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// XML writing error.
    #[error("XML writing error: {0}")]
    XmlWrite(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// The binding payload is malformed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Key or certificate handling error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Session attribute access failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl SamlError {
    /// Creates a processing error without a cause.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a processing error wrapping `cause`.
    pub fn processing_caused_by(message: impl Into<String>, cause: SamlError) -> Self {
        Self::Processing {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Returns the wrapped cause of a processing error.
    #[must_use]
    pub fn cause(&self) -> Option<&SamlError> {
        match self {
            Self::Processing { source, .. } => source.as_deref(),
            _ => None,
        }
    }

    /// Returns the innermost error, following processing causes.
    #[must_use]
    pub fn root_cause(&self) -> &SamlError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// Returns the HTTP status the chain driver reports for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.root_cause() {
            Self::IssuerNotTrusted(_)
            | Self::SignatureValidation(_)
            | Self::AssertionExpired
            | Self::InResponseToMismatch { .. } => 403,
            Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::InvalidMessage(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_) => 400,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::XmlWrite(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<pl_crypto::CryptoError> for SamlError {
    fn from(err: pl_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
