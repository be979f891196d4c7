//! XML Digital Signature support.
//!
//! Enveloped RSA signatures over SAML elements referenced by `ID`, plus the
//! detached query-string signatures of the HTTP-Redirect binding.
//!
//! Canonicalization is whitespace normalization of the exact serialized
//! element, so signer and validator must see the same bytes. Messages
//! produced by [`crate::writer`] and carried by either binding satisfy this.

mod signer;
mod validator;

use std::collections::HashSet;
use std::ops::Range;

use base64::Engine;
use pl_crypto::{HashAlgorithm, RsaAlgorithm};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::digest_algorithms;

pub use signer::*;
pub use validator::*;

/// The parts of a `ds:Signature` element needed for validation.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// Signature algorithm.
    pub algorithm: RsaAlgorithm,
    /// Digest algorithm of the reference.
    pub digest_algorithm: HashAlgorithm,
    /// The reference URI, `#` followed by the signed element's ID.
    pub reference_uri: String,
    /// Base64 digest value.
    pub digest_value: String,
    /// Base64 signature value.
    pub signature_value: String,
    /// Embedded base64 DER certificate, if any.
    pub x509_certificate: Option<String>,
}

/// Private key and certificate used to sign outbound messages.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// PKCS#8 or PKCS#1 DER private key.
    pub private_key_der: Vec<u8>,
    /// DER certificate embedded in `KeyInfo`.
    pub certificate_der: Option<Vec<u8>>,
}

impl KeyPair {
    /// Loads a key pair from PEM text.
    pub fn from_pem(private_key_pem: &str, certificate_pem: Option<&str>) -> SamlResult<Self> {
        let private_key_der = pem_to_der(private_key_pem, "PRIVATE KEY")
            .or_else(|| pem_to_der(private_key_pem, "RSA PRIVATE KEY"))
            .ok_or_else(|| SamlError::Crypto("Invalid private key PEM".to_string()))?;

        let certificate_der = certificate_pem.map(certificate_from_pem).transpose()?;

        Ok(Self {
            private_key_der,
            certificate_der,
        })
    }
}

/// Decodes a PEM certificate to DER.
pub fn certificate_from_pem(pem: &str) -> SamlResult<Vec<u8>> {
    pem_to_der(pem, "CERTIFICATE")
        .ok_or_else(|| SamlError::Crypto("Invalid certificate PEM".to_string()))
}

fn pem_to_der(pem: &str, label: &str) -> Option<Vec<u8>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let start = pem.find(&begin)? + begin.len();
    let end_pos = pem.find(&end)?;

    let b64_data: String = pem
        .get(start..end_pos)?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD.decode(b64_data).ok()
}

/// Simplified canonical form: whitespace runs collapse to one space.
pub(crate) fn canonicalize(xml: &str) -> String {
    xml.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) const fn digest_uri(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => digest_algorithms::SHA256,
        HashAlgorithm::Sha384 => digest_algorithms::SHA384,
        HashAlgorithm::Sha512 => digest_algorithms::SHA512,
    }
}

pub(crate) fn digest_from_uri(uri: &str) -> Option<HashAlgorithm> {
    [HashAlgorithm::Sha256, HashAlgorithm::Sha384, HashAlgorithm::Sha512]
        .into_iter()
        .find(|alg| digest_uri(*alg) == uri)
}

/// Location of an element within a serialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ElementSpan {
    /// Offset of the element's `<`.
    pub(crate) start: usize,
    /// Offset just past the start tag's `>`.
    pub(crate) start_tag_end: usize,
    /// Offset just past the matching end tag.
    pub(crate) end: usize,
    /// The element's `ID` attribute.
    pub(crate) id: Option<String>,
}

impl ElementSpan {
    pub(crate) fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

fn offset<P>(position: P) -> SamlResult<usize>
where
    P: TryInto<usize>,
    P::Error: std::fmt::Display,
{
    position
        .try_into()
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn id_attribute(start: &BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"ID")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Finds the first element matching `predicate` and the extent of its
/// subtree, tracking depth so nested elements with the same name are handled.
pub(crate) fn find_element<F>(xml: &str, predicate: F) -> SamlResult<Option<ElementSpan>>
where
    F: Fn(&BytesStart<'_>) -> bool,
{
    let mut reader = Reader::from_str(xml);
    let mut found: Option<ElementSpan> = None;
    let mut depth = 0usize;

    loop {
        let before = offset(reader.buffer_position())?;
        let event = reader.read_event()?;
        let after = offset(reader.buffer_position())?;

        match event {
            Event::Start(e) => {
                if found.is_some() {
                    depth += 1;
                } else if predicate(&e) {
                    found = Some(ElementSpan {
                        start: before,
                        start_tag_end: after,
                        end: after,
                        id: id_attribute(&e),
                    });
                    depth = 1;
                }
            }
            Event::Empty(e) => {
                if found.is_none() && predicate(&e) {
                    return Ok(Some(ElementSpan {
                        start: before,
                        start_tag_end: after,
                        end: after,
                        id: id_attribute(&e),
                    }));
                }
            }
            Event::End(_) => {
                if let Some(span) = found.as_mut() {
                    depth -= 1;
                    if depth == 0 {
                        span.end = after;
                        return Ok(found);
                    }
                }
            }
            Event::Eof => {
                return match found {
                    Some(_) => Err(SamlError::XmlParse("Unclosed element".to_string())),
                    None => Ok(None),
                };
            }
            _ => {}
        }
    }
}

/// Returns the first `ID` value carried by more than one element.
pub(crate) fn duplicate_id(xml: &str) -> SamlResult<Option<String>> {
    let mut reader = Reader::from_str(xml);
    let mut seen = HashSet::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if let Some(id) = id_attribute(&e) {
                    if !seen.insert(id.clone()) {
                        return Ok(Some(id));
                    }
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Finds the element whose `ID` attribute equals `id`.
pub(crate) fn find_element_by_id(xml: &str, id: &str) -> SamlResult<Option<ElementSpan>> {
    find_element(xml, |start| id_attribute(start).as_deref() == Some(id))
}

/// Finds the first element with the given local name.
pub(crate) fn find_element_by_name(xml: &str, local_name: &str) -> SamlResult<Option<ElementSpan>> {
    find_element(xml, |start| start.local_name().as_ref() == local_name.as_bytes())
}
