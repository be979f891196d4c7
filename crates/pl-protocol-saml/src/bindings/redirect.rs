//! HTTP-Redirect binding.

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

use super::{DecodedMessage, RedirectSignature, SamlMessageType};

/// Upper bound on an inflated message, against deflate bombs.
const MAX_INFLATED_SIZE: u64 = 256 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes an unsigned message into a redirect URL.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let query = Self::encode_query(xml, relay_state, message_type)?;
        Ok(Self::append_query(destination, &query))
    }

    /// Builds `SAMLRequest=..[&RelayState=..]` for a message.
    ///
    /// This is also the prefix a redirect signature is computed over.
    pub fn encode_query(
        xml: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> SamlResult<String> {
        let encoded = deflate_encode(xml)?;
        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        Ok(query)
    }

    /// Appends a query string to a destination URL.
    #[must_use]
    pub fn append_query(destination: &str, query: &str) -> String {
        let separator = if destination.contains('?') { '&' } else { '?' };
        format!("{destination}{separator}{query}")
    }

    /// Decodes already URL-decoded query parameter values.
    ///
    /// The redirect signature is not recoverable from decoded values; use
    /// [`HttpRedirectBinding::decode_url`] when it has to be verified.
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = match (saml_request, saml_response) {
            (Some(request), _) => (request, SamlMessageType::Request),
            (None, Some(response)) => (response, SamlMessageType::Response),
            (None, None) => {
                return Err(SamlError::InvalidMessage(
                    "No SAMLRequest or SAMLResponse parameter".to_string(),
                ))
            }
        };

        let deflated = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        let xml_bytes = deflate_decompress(&deflated)?;
        let xml = String::from_utf8(xml_bytes)
            .map_err(|e| SamlError::InvalidMessage(format!("Invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            binding: SamlBinding::HttpRedirect,
            relay_state: relay_state.map(String::from),
            redirect_signature: None,
        })
    }

    /// Decodes a message from a full redirect URL, keeping the signed
    /// portion of the query when a `Signature` parameter is present.
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidMessage(format!("Invalid URL: {e}")))?;

        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;
        let mut signature = None;
        let mut sig_alg = None;

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "SAMLRequest" => saml_request = Some(value.into_owned()),
                "SAMLResponse" => saml_response = Some(value.into_owned()),
                "RelayState" => relay_state = Some(value.into_owned()),
                "Signature" => signature = Some(value.into_owned()),
                "SigAlg" => sig_alg = Some(value.into_owned()),
                _ => {}
            }
        }

        let mut decoded = Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )?;

        if let Some(signature) = signature {
            let sig_alg = sig_alg.ok_or_else(|| {
                SamlError::InvalidMessage("Signature present without SigAlg".to_string())
            })?;
            decoded.redirect_signature = Some(RedirectSignature {
                signed_query: Self::extract_signed_query(url)?,
                signature,
                sig_alg,
            });
        }

        Ok(decoded)
    }

    /// Rebuilds the signed portion of a redirect query:
    /// `SAMLRequest`/`SAMLResponse`, `RelayState` and `SigAlg`, in URL order.
    pub fn extract_signed_query(url: &str) -> SamlResult<String> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidMessage(format!("Invalid URL: {e}")))?;

        let parts: Vec<String> = parsed
            .query_pairs()
            .filter(|(key, _)| {
                matches!(
                    key.as_ref(),
                    "SAMLRequest" | "SAMLResponse" | "RelayState" | "SigAlg"
                )
            })
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect();

        if parts.is_empty() {
            return Err(SamlError::InvalidMessage(
                "No SAML parameters found".to_string(),
            ));
        }

        Ok(parts.join("&"))
    }
}

/// Deflates and base64-encodes a message.
pub(crate) fn deflate_encode(xml: &str) -> SamlResult<String> {
    let compressed = deflate_compress(xml.as_bytes())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Compresses data using raw DEFLATE (no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_SIZE + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;

    if decompressed.len() as u64 > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "Inflated message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(decompressed)
}
