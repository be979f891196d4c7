//! XML signature creation.

use base64::Engine;
use pl_crypto::RsaAlgorithm;

use crate::error::{SamlError, SamlResult};
use crate::types::{ENVELOPED_SIGNATURE, EXCLUSIVE_C14N, XMLDSIG_NS};

use super::{canonicalize, digest_uri, find_element_by_id, find_element_by_name, KeyPair};

/// Signs SAML documents with an RSA key.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    key_pair: KeyPair,
    algorithm: RsaAlgorithm,
}

impl XmlSigner {
    /// Creates a signer using RSA-SHA256.
    #[must_use]
    pub fn new(key_pair: KeyPair) -> Self {
        Self {
            key_pair,
            algorithm: RsaAlgorithm::Rs256,
        }
    }

    /// Sets the signature algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: RsaAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Returns the signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> RsaAlgorithm {
        self.algorithm
    }

    /// Signs the element whose `ID` is `reference_id` and returns the
    /// document with an enveloped `ds:Signature` inserted right after that
    /// element's `Issuer`.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let span = find_element_by_id(xml, reference_id)?.ok_or_else(|| {
            SamlError::SignatureCreation(format!("Element with ID '{reference_id}' not found"))
        })?;

        let element = &xml[span.range()];
        let digest = pl_crypto::digest(self.algorithm.hash(), canonicalize(element).as_bytes());
        let digest_b64 = base64::engine::general_purpose::STANDARD.encode(digest);

        let signed_info = self.signed_info(reference_id, &digest_b64);
        let signature_value = self.sign_data(canonicalize(&signed_info).as_bytes())?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);
        let signature = self.signature_element(&signed_info, &signature_b64);

        let insert_at = match find_element_by_name(element, "Issuer")? {
            Some(issuer) => span.start + issuer.end,
            None => span.start_tag_end,
        };

        Ok(format!("{}{}{}", &xml[..insert_at], signature, &xml[insert_at..]))
    }

    /// Signs an HTTP-Redirect query prefix (`SAMLRequest=..[&RelayState=..]`)
    /// and returns it completed with `SigAlg` and `Signature`.
    pub fn sign_redirect_query(&self, query: &str) -> SamlResult<String> {
        let to_sign = format!(
            "{query}&SigAlg={}",
            urlencoding::encode(self.algorithm.xml_dsig_uri())
        );
        let signature = self.sign_data(to_sign.as_bytes())?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature);

        Ok(format!(
            "{to_sign}&Signature={}",
            urlencoding::encode(&signature_b64)
        ))
    }

    fn sign_data(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        pl_crypto::rsa_sign(&self.key_pair.private_key_der, data, self.algorithm)
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))
    }

    fn signed_info(&self, reference_id: &str, digest_b64: &str) -> String {
        format!(
            r##"<ds:SignedInfo xmlns:ds="{XMLDSIG_NS}"><ds:CanonicalizationMethod Algorithm="{EXCLUSIVE_C14N}"/><ds:SignatureMethod Algorithm="{}"/><ds:Reference URI="#{reference_id}"><ds:Transforms><ds:Transform Algorithm="{ENVELOPED_SIGNATURE}"/><ds:Transform Algorithm="{EXCLUSIVE_C14N}"/></ds:Transforms><ds:DigestMethod Algorithm="{}"/><ds:DigestValue>{digest_b64}</ds:DigestValue></ds:Reference></ds:SignedInfo>"##,
            self.algorithm.xml_dsig_uri(),
            digest_uri(self.algorithm.hash()),
        )
    }

    fn signature_element(&self, signed_info: &str, signature_b64: &str) -> String {
        let key_info = self
            .key_pair
            .certificate_der
            .as_ref()
            .map(|cert| {
                format!(
                    "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                    base64::engine::general_purpose::STANDARD.encode(cert)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<ds:Signature xmlns:ds="{XMLDSIG_NS}">{signed_info}<ds:SignatureValue>{signature_b64}</ds:SignatureValue>{key_info}</ds:Signature>"#
        )
    }
}
