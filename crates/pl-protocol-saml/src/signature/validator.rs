//! XML signature validation.

use base64::Engine;
use pl_crypto::RsaAlgorithm;

use crate::bindings::RedirectSignature;
use crate::error::{SamlError, SamlResult};
use crate::parser;

use super::{
    canonicalize, certificate_from_pem, digest_from_uri, duplicate_id, find_element_by_id,
    find_element_by_name, XmlSignature,
};

fn invalid(message: impl Into<String>) -> SamlError {
    SamlError::SignatureValidation(message.into())
}

/// Validates signatures against a set of trusted certificates.
#[derive(Debug, Clone, Default)]
pub struct XmlSignatureValidator {
    trusted_certificates: Vec<Vec<u8>>,
}

impl XmlSignatureValidator {
    /// Creates a validator trusting the given DER certificates.
    #[must_use]
    pub fn new(trusted_certificates: Vec<Vec<u8>>) -> Self {
        Self {
            trusted_certificates,
        }
    }

    /// Creates a validator from PEM certificates.
    pub fn from_pem(certificates_pem: &[&str]) -> SamlResult<Self> {
        let certificates = certificates_pem
            .iter()
            .map(|pem| certificate_from_pem(pem))
            .collect::<SamlResult<Vec<_>>>()?;
        Ok(Self::new(certificates))
    }

    /// Validates the first enveloped signature of a document.
    ///
    /// Documents in which two elements share an `ID` are rejected, so the
    /// reference names exactly one element. The signature must sit inside
    /// the element it references. Callers must still check that the signed
    /// element is the one they consume. The digest
    /// is recomputed over that element with the signature removed, and the
    /// `SignedInfo` signature is checked with the embedded certificate when
    /// it is trusted, otherwise with every trusted certificate in turn.
    pub fn validate(&self, xml: &str) -> SamlResult<XmlSignature> {
        if let Some(id) = duplicate_id(xml)? {
            return Err(invalid(format!("Duplicate ID '{id}' in document")));
        }

        let signature_span = find_element_by_name(xml, "Signature")?
            .ok_or_else(|| invalid("No Signature element found"))?;
        let signature_xml = &xml[signature_span.range()];
        let signature = extract_signature(signature_xml)?;

        let reference_id = signature
            .reference_uri
            .strip_prefix('#')
            .ok_or_else(|| invalid("Only same-document references are supported"))?;
        let element = find_element_by_id(xml, reference_id)?
            .ok_or_else(|| invalid(format!("Referenced element '{reference_id}' not found")))?;
        if signature_span.start < element.start || signature_span.end > element.end {
            return Err(invalid("Signature is not enveloped by the referenced element"));
        }

        let unsigned = format!(
            "{}{}",
            &xml[element.start..signature_span.start],
            &xml[signature_span.end..element.end]
        );
        let digest = pl_crypto::digest(
            signature.digest_algorithm,
            canonicalize(&unsigned).as_bytes(),
        );
        if base64::engine::general_purpose::STANDARD.encode(digest) != signature.digest_value {
            return Err(invalid("Digest value mismatch"));
        }

        let signed_info = find_element_by_name(signature_xml, "SignedInfo")?
            .ok_or_else(|| invalid("No SignedInfo element found"))?;
        let signed_info = canonicalize(&signature_xml[signed_info.range()]);
        let signature_bytes = decode_b64(&signature.signature_value)?;

        let candidates = self.candidate_certificates(&signature)?;
        if candidates
            .iter()
            .any(|cert| verify_with_cert(signed_info.as_bytes(), &signature_bytes, cert, signature.algorithm))
        {
            Ok(signature)
        } else {
            Err(invalid("Signature verification failed"))
        }
    }

    /// Validates a detached HTTP-Redirect signature.
    pub fn validate_redirect(&self, redirect: &RedirectSignature) -> SamlResult<()> {
        let algorithm = RsaAlgorithm::from_xml_dsig_uri(&redirect.sig_alg)
            .ok_or_else(|| invalid(format!("Unsupported signature algorithm: {}", redirect.sig_alg)))?;
        let signature = decode_b64(&redirect.signature)?;

        if self.trusted_certificates.is_empty() {
            return Err(invalid("No trusted certificate configured"));
        }

        if self.trusted_certificates.iter().any(|cert| {
            verify_with_cert(redirect.signed_query.as_bytes(), &signature, cert, algorithm)
        }) {
            Ok(())
        } else {
            Err(invalid(
                "Signature verification failed with all trusted certificates",
            ))
        }
    }

    fn candidate_certificates(&self, signature: &XmlSignature) -> SamlResult<Vec<Vec<u8>>> {
        if self.trusted_certificates.is_empty() {
            return Err(invalid("No trusted certificate configured"));
        }

        if let Some(embedded) = &signature.x509_certificate {
            let embedded = decode_b64(embedded)?;
            if self.trusted_certificates.contains(&embedded) {
                return Ok(vec![embedded]);
            }
        }

        Ok(self.trusted_certificates.clone())
    }
}

fn decode_b64(value: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| invalid(format!("Invalid base64: {e}")))
}

fn verify_with_cert(data: &[u8], signature: &[u8], cert_der: &[u8], algorithm: RsaAlgorithm) -> bool {
    match pl_crypto::public_key_from_certificate(cert_der) {
        Ok(public_key) => pl_crypto::rsa_verify(&public_key, data, signature, algorithm),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unusable trusted certificate");
            false
        }
    }
}

fn extract_signature(signature_xml: &str) -> SamlResult<XmlSignature> {
    let node = parser::parse_tree(signature_xml)?;
    let signed_info = node
        .child("SignedInfo")
        .ok_or_else(|| invalid("No SignedInfo element found"))?;
    let reference = signed_info
        .child("Reference")
        .ok_or_else(|| invalid("No Reference element found"))?;

    let algorithm = signed_info
        .child("SignatureMethod")
        .and_then(|method| method.attr("Algorithm"))
        .and_then(RsaAlgorithm::from_xml_dsig_uri)
        .ok_or_else(|| invalid("Unsupported or missing SignatureMethod"))?;
    let digest_algorithm = reference
        .child("DigestMethod")
        .and_then(|method| method.attr("Algorithm"))
        .and_then(digest_from_uri)
        .ok_or_else(|| invalid("Unsupported or missing DigestMethod"))?;

    Ok(XmlSignature {
        algorithm,
        digest_algorithm,
        reference_uri: reference.attr("URI").unwrap_or_default().to_string(),
        digest_value: reference
            .child("DigestValue")
            .map(|value| value.text().to_string())
            .ok_or_else(|| invalid("No DigestValue element found"))?,
        signature_value: node
            .child("SignatureValue")
            .map(|value| value.text().to_string())
            .ok_or_else(|| invalid("No SignatureValue element found"))?,
        x509_certificate: node
            .child("KeyInfo")
            .and_then(|key_info| key_info.child("X509Data"))
            .and_then(|data| data.child("X509Certificate"))
            .map(|cert| cert.text().to_string()),
    })
}
