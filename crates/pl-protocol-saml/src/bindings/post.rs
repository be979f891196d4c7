//! HTTP-POST binding.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;

use super::{DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Builds an HTML page whose form auto-submits the message to
    /// `destination`.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let param_name = message_type.form_param();

        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>HTTP Post Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            param_name,
            encoded,
            relay_state_input
        )
    }

    /// Decodes a message from HTTP-POST form fields.
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

        // Form posts may wrap the base64 value across lines.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::InvalidMessage(format!("Invalid UTF-8 in message: {e}")))?;

        Ok(DecodedMessage {
            xml,
            message_type,
            binding: SamlBinding::HttpPost,
            relay_state: relay_state.map(String::from),
            redirect_signature: None,
        })
    }

    /// Pulls the `SAMLRequest`/`SAMLResponse` and `RelayState` values back
    /// out of a page produced by [`HttpPostBinding::encode`].
    pub fn decode_form(html: &str) -> SamlResult<DecodedMessage> {
        let field = |name: &str| {
            let marker = format!(r#"name="{name}" value=""#);
            let start = html.find(&marker)? + marker.len();
            let end = html[start..].find('"')?;
            Some(html_unescape(&html[start..start + end]))
        };

        Self::decode(
            field("SAMLRequest").as_deref(),
            field("SAMLResponse").as_deref(),
            field("RelayState").as_deref(),
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn html_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
