//! X.509 certificate helpers.

use x509_parser::prelude::*;

use crate::error::CryptoError;

/// Returns the DER `SubjectPublicKeyInfo` of a DER certificate.
pub fn public_key_from_certificate(cert_der: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| CryptoError::InvalidCertificate(format!("Failed to parse certificate: {e}")))?;

    Ok(cert.public_key().raw.to_vec())
}

/// Returns the subject distinguished name and its first common name.
pub fn subject_common_name(cert_der: &[u8]) -> Result<(String, Option<String>), CryptoError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| CryptoError::InvalidCertificate(format!("Failed to parse certificate: {e}")))?;

    let subject = cert.subject();
    let cn = subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);

    Ok((subject.to_string(), cn))
}
