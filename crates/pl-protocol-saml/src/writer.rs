//! XML serialization of SAML messages.
//!
//! Output is compact (no indentation) with the `samlp`, `saml`, `ds` and
//! `xenc` prefixes. Attribute values and text are escaped by quick-xml.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::SamlResult;
use crate::types::{
    Assertion, AssertionKind, AuthnRequest, EncryptedAssertion, LogoutRequest, LogoutResponse,
    NameId, Response, SamlMessage, Status, StatusCode, Subject, SAMLP_NS, SAML_NS, SAML_VERSION,
    XMLDSIG_NS, XMLENC_NS,
};

/// Serializes a protocol message.
pub fn to_xml(message: &SamlMessage) -> SamlResult<String> {
    let mut out = XmlOut::new();
    match message {
        SamlMessage::AuthnRequest(request) => out.authn_request(request)?,
        SamlMessage::LogoutRequest(request) => out.logout_request(request)?,
        SamlMessage::Response(response) => out.response(response)?,
        SamlMessage::LogoutResponse(response) => out.logout_response(response)?,
    }
    out.finish()
}

/// Serializes a standalone assertion.
pub fn assertion_to_xml(assertion: &Assertion) -> SamlResult<String> {
    let mut out = XmlOut::new();
    out.assertion(assertion)?;
    out.finish()
}

/// Formats an instant as an `xs:dateTime` in UTC.
pub(crate) fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn finish(self) -> SamlResult<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| crate::error::SamlError::XmlWrite(e.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> SamlResult<()> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.writer.write_event(Event::Start(element))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> SamlResult<()> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> SamlResult<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> SamlResult<()> {
        self.start(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn issuer(&mut self, issuer: &str) -> SamlResult<()> {
        self.text_element("saml:Issuer", &[], issuer)
    }

    fn name_id(&mut self, name_id: &NameId) -> SamlResult<()> {
        let mut attributes = Vec::new();
        if let Some(format) = &name_id.format {
            attributes.push(("Format", format.as_str()));
        }
        self.text_element("saml:NameID", &attributes, &name_id.value)
    }

    fn authn_request(&mut self, request: &AuthnRequest) -> SamlResult<()> {
        let issue_instant = format_instant(&request.issue_instant);
        let mut attributes = vec![
            ("xmlns:samlp", SAMLP_NS),
            ("xmlns:saml", SAML_NS),
            ("ID", request.id.as_str()),
            ("Version", SAML_VERSION),
            ("IssueInstant", issue_instant.as_str()),
        ];
        if let Some(destination) = &request.destination {
            attributes.push(("Destination", destination.as_str()));
        }
        if let Some(acs) = &request.assertion_consumer_service_url {
            attributes.push(("AssertionConsumerServiceURL", acs.as_str()));
        }
        if let Some(binding) = &request.protocol_binding {
            attributes.push(("ProtocolBinding", binding.as_str()));
        }
        if request.force_authn {
            attributes.push(("ForceAuthn", "true"));
        }
        if request.is_passive {
            attributes.push(("IsPassive", "true"));
        }

        self.start("samlp:AuthnRequest", &attributes)?;
        self.issuer(&request.issuer)?;
        if let Some(format) = &request.name_id_policy_format {
            self.empty(
                "samlp:NameIDPolicy",
                &[("Format", format.as_str()), ("AllowCreate", "true")],
            )?;
        }
        self.end("samlp:AuthnRequest")
    }

    fn logout_request(&mut self, request: &LogoutRequest) -> SamlResult<()> {
        let issue_instant = format_instant(&request.issue_instant);
        let not_on_or_after = request.not_on_or_after.as_ref().map(format_instant);
        let mut attributes = vec![
            ("xmlns:samlp", SAMLP_NS),
            ("xmlns:saml", SAML_NS),
            ("ID", request.id.as_str()),
            ("Version", SAML_VERSION),
            ("IssueInstant", issue_instant.as_str()),
        ];
        if let Some(destination) = &request.destination {
            attributes.push(("Destination", destination.as_str()));
        }
        if let Some(not_on_or_after) = &not_on_or_after {
            attributes.push(("NotOnOrAfter", not_on_or_after.as_str()));
        }
        if let Some(reason) = &request.reason {
            attributes.push(("Reason", reason.as_str()));
        }

        self.start("samlp:LogoutRequest", &attributes)?;
        self.issuer(&request.issuer)?;
        if let Some(name_id) = &request.name_id {
            self.name_id(name_id)?;
        }
        for index in &request.session_indexes {
            self.text_element("samlp:SessionIndex", &[], index)?;
        }
        self.end("samlp:LogoutRequest")
    }

    fn status_response_start(
        &mut self,
        element: &str,
        id: &str,
        issue_instant: &DateTime<Utc>,
        destination: Option<&str>,
        in_response_to: Option<&str>,
    ) -> SamlResult<()> {
        let issue_instant = format_instant(issue_instant);
        let mut attributes = vec![
            ("xmlns:samlp", SAMLP_NS),
            ("xmlns:saml", SAML_NS),
            ("ID", id),
            ("Version", SAML_VERSION),
            ("IssueInstant", issue_instant.as_str()),
        ];
        if let Some(destination) = destination {
            attributes.push(("Destination", destination));
        }
        if let Some(in_response_to) = in_response_to {
            attributes.push(("InResponseTo", in_response_to));
        }
        self.start(element, &attributes)
    }

    fn response(&mut self, response: &Response) -> SamlResult<()> {
        self.status_response_start(
            "samlp:Response",
            &response.id,
            &response.issue_instant,
            response.destination.as_deref(),
            response.in_response_to.as_deref(),
        )?;
        self.issuer(&response.issuer)?;
        self.status(&response.status)?;
        for kind in &response.assertions {
            match kind {
                AssertionKind::Plain(assertion) => self.assertion(assertion)?,
                AssertionKind::Encrypted(encrypted) => self.encrypted_assertion(encrypted)?,
            }
        }
        self.end("samlp:Response")
    }

    fn logout_response(&mut self, response: &LogoutResponse) -> SamlResult<()> {
        self.status_response_start(
            "samlp:LogoutResponse",
            &response.id,
            &response.issue_instant,
            response.destination.as_deref(),
            response.in_response_to.as_deref(),
        )?;
        self.issuer(&response.issuer)?;
        self.status(&response.status)?;
        self.end("samlp:LogoutResponse")
    }

    fn status(&mut self, status: &Status) -> SamlResult<()> {
        self.start("samlp:Status", &[])?;
        self.status_code(&status.status_code)?;
        if let Some(message) = &status.status_message {
            self.text_element("samlp:StatusMessage", &[], message)?;
        }
        self.end("samlp:Status")
    }

    fn status_code(&mut self, code: &StatusCode) -> SamlResult<()> {
        let attributes = [("Value", code.value.as_str())];
        match &code.nested {
            Some(nested) => {
                self.start("samlp:StatusCode", &attributes)?;
                self.status_code(nested)?;
                self.end("samlp:StatusCode")
            }
            None => self.empty("samlp:StatusCode", &attributes),
        }
    }

    fn assertion(&mut self, assertion: &Assertion) -> SamlResult<()> {
        let issue_instant = format_instant(&assertion.issue_instant);
        self.start(
            "saml:Assertion",
            &[
                ("xmlns:saml", SAML_NS),
                ("ID", assertion.id.as_str()),
                ("Version", SAML_VERSION),
                ("IssueInstant", issue_instant.as_str()),
            ],
        )?;
        self.issuer(&assertion.issuer)?;

        if let Some(subject) = &assertion.subject {
            self.subject(subject)?;
        }

        if let Some(conditions) = &assertion.conditions {
            let not_before = conditions.not_before.as_ref().map(format_instant);
            let not_on_or_after = conditions.not_on_or_after.as_ref().map(format_instant);
            let mut attributes = Vec::new();
            if let Some(not_before) = &not_before {
                attributes.push(("NotBefore", not_before.as_str()));
            }
            if let Some(not_on_or_after) = &not_on_or_after {
                attributes.push(("NotOnOrAfter", not_on_or_after.as_str()));
            }
            if conditions.audiences.is_empty() {
                self.empty("saml:Conditions", &attributes)?;
            } else {
                self.start("saml:Conditions", &attributes)?;
                self.start("saml:AudienceRestriction", &[])?;
                for audience in &conditions.audiences {
                    self.text_element("saml:Audience", &[], audience)?;
                }
                self.end("saml:AudienceRestriction")?;
                self.end("saml:Conditions")?;
            }
        }

        if let Some(statement) = &assertion.authn_statement {
            let authn_instant = format_instant(&statement.authn_instant);
            let mut attributes = vec![("AuthnInstant", authn_instant.as_str())];
            if let Some(index) = &statement.session_index {
                attributes.push(("SessionIndex", index.as_str()));
            }
            self.start("saml:AuthnStatement", &attributes)?;
            self.start("saml:AuthnContext", &[])?;
            self.text_element("saml:AuthnContextClassRef", &[], &statement.context_class_ref)?;
            self.end("saml:AuthnContext")?;
            self.end("saml:AuthnStatement")?;
        }

        for statement in &assertion.attribute_statements {
            self.start("saml:AttributeStatement", &[])?;
            for attribute in &statement.attributes {
                let mut attributes = vec![("Name", attribute.name.as_str())];
                if let Some(friendly_name) = &attribute.friendly_name {
                    attributes.push(("FriendlyName", friendly_name.as_str()));
                }
                if let Some(name_format) = &attribute.name_format {
                    attributes.push(("NameFormat", name_format.as_str()));
                }
                self.start("saml:Attribute", &attributes)?;
                for value in &attribute.values {
                    self.text_element("saml:AttributeValue", &[], value)?;
                }
                self.end("saml:Attribute")?;
            }
            self.end("saml:AttributeStatement")?;
        }

        self.end("saml:Assertion")
    }

    fn subject(&mut self, subject: &Subject) -> SamlResult<()> {
        self.start("saml:Subject", &[])?;
        if let Some(name_id) = &subject.name_id {
            self.name_id(name_id)?;
        }
        for confirmation in &subject.confirmations {
            self.start(
                "saml:SubjectConfirmation",
                &[("Method", confirmation.method.as_str())],
            )?;
            if let Some(data) = &confirmation.data {
                let not_on_or_after = data.not_on_or_after.as_ref().map(format_instant);
                let mut attributes = Vec::new();
                if let Some(in_response_to) = &data.in_response_to {
                    attributes.push(("InResponseTo", in_response_to.as_str()));
                }
                if let Some(recipient) = &data.recipient {
                    attributes.push(("Recipient", recipient.as_str()));
                }
                if let Some(not_on_or_after) = &not_on_or_after {
                    attributes.push(("NotOnOrAfter", not_on_or_after.as_str()));
                }
                self.empty("saml:SubjectConfirmationData", &attributes)?;
            }
            self.end("saml:SubjectConfirmation")?;
        }
        self.end("saml:Subject")
    }

    fn encrypted_assertion(&mut self, encrypted: &EncryptedAssertion) -> SamlResult<()> {
        self.start("saml:EncryptedAssertion", &[])?;
        self.start(
            "xenc:EncryptedData",
            &[
                ("xmlns:xenc", XMLENC_NS),
                ("Type", "http://www.w3.org/2001/04/xmlenc#Element"),
            ],
        )?;
        if let Some(method) = &encrypted.encryption_method {
            self.empty("xenc:EncryptionMethod", &[("Algorithm", method.as_str())])?;
        }
        if let Some(key) = &encrypted.encrypted_key {
            self.start("ds:KeyInfo", &[("xmlns:ds", XMLDSIG_NS)])?;
            self.start("xenc:EncryptedKey", &[])?;
            if let Some(method) = &key.encryption_method {
                self.empty("xenc:EncryptionMethod", &[("Algorithm", method.as_str())])?;
            }
            self.cipher_data(&key.cipher_value)?;
            self.end("xenc:EncryptedKey")?;
            self.end("ds:KeyInfo")?;
        }
        self.cipher_data(&encrypted.cipher_value)?;
        self.end("xenc:EncryptedData")?;
        self.end("saml:EncryptedAssertion")
    }

    fn cipher_data(&mut self, cipher_value: &str) -> SamlResult<()> {
        self.start("xenc:CipherData", &[])?;
        self.text_element("xenc:CipherValue", &[], cipher_value)?;
        self.end("xenc:CipherData")
    }
}
