//! XML parsing of SAML messages.
//!
//! The document is first read into a small element tree keyed by local name
//! (namespace prefixes are dropped), then mapped onto the message types.
//! Unknown elements, including `ds:Signature`, are ignored. DOCTYPE
//! declarations are rejected.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};
use crate::types::{
    Assertion, AssertionKind, Attribute, AttributeStatement, AuthnRequest, AuthnStatement,
    Conditions, EncryptedAssertion, EncryptedKey, LogoutRequest, LogoutResponse, NameId, Response,
    SamlMessage, Status, StatusCode, Subject, SubjectConfirmation, SubjectConfirmationData,
};

/// Parses a SAML protocol message.
pub fn parse(xml: &str) -> SamlResult<SamlMessage> {
    let root = parse_tree(xml)?;
    match root.name.as_str() {
        "AuthnRequest" => authn_request(&root).map(SamlMessage::AuthnRequest),
        "LogoutRequest" => logout_request(&root).map(SamlMessage::LogoutRequest),
        "Response" => response(&root).map(SamlMessage::Response),
        "LogoutResponse" => logout_response(&root).map(SamlMessage::LogoutResponse),
        other => Err(SamlError::InvalidMessage(format!(
            "Unsupported SAML message: {other}"
        ))),
    }
}

/// Parses a standalone `Assertion` element, such as a decrypted assertion.
pub fn parse_assertion(xml: &str) -> SamlResult<Assertion> {
    let root = parse_tree(xml)?;
    if root.name != "Assertion" {
        return Err(SamlError::InvalidMessage(format!(
            "Expected Assertion, found {}",
            root.name
        )));
    }
    assertion(&root)
}

/// A parsed element, keyed by local name.
#[derive(Debug, Default)]
pub(crate) struct Node {
    pub(crate) name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    text: String,
}

impl Node {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required_attr(&self, name: &str) -> SamlResult<&str> {
        self.attr(name)
            .ok_or_else(|| SamlError::MissingElement(format!("{}@{name}", self.name)))
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub(crate) fn text(&self) -> &str {
        self.text.trim()
    }
}

fn local_name(qualified: &[u8]) -> String {
    let name = String::from_utf8_lossy(qualified);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn node_from(start: &BytesStart<'_>) -> SamlResult<Node> {
    let mut node = Node {
        name: local_name(start.name().as_ref()),
        ..Node::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let key = attribute.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let value = attribute
            .unescape_value()
            .map_err(|e| SamlError::XmlParse(e.to_string()))?;
        node.attributes.push((local_name(key), value.into_owned()));
    }
    Ok(node)
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

pub(crate) fn parse_tree(xml: &str) -> SamlResult<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(node_from(&e)?),
            Ok(Event::Empty(e)) => {
                let node = node_from(&e)?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("Unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| SamlError::XmlParse(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::DocType(_)) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("Unclosed element".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("Empty document".to_string()))
}

fn instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlParse(format!("Invalid dateTime '{value}': {e}")))
}

fn optional_instant(node: &Node, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    node.attr(name).map(instant).transpose()
}

fn issuer(node: &Node) -> SamlResult<String> {
    node.child("Issuer")
        .map(|issuer| issuer.text().to_string())
        .ok_or_else(|| SamlError::MissingElement(format!("{}/Issuer", node.name)))
}

fn name_id(node: &Node) -> Option<NameId> {
    node.child("NameID").map(|name_id| NameId {
        value: name_id.text().to_string(),
        format: name_id.attr("Format").map(str::to_string),
    })
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn authn_request(node: &Node) -> SamlResult<AuthnRequest> {
    Ok(AuthnRequest {
        id: node.required_attr("ID")?.to_string(),
        issue_instant: instant(node.required_attr("IssueInstant")?)?,
        issuer: issuer(node)?,
        destination: owned(node.attr("Destination")),
        assertion_consumer_service_url: owned(node.attr("AssertionConsumerServiceURL")),
        protocol_binding: owned(node.attr("ProtocolBinding")),
        name_id_policy_format: node
            .child("NameIDPolicy")
            .and_then(|policy| owned(policy.attr("Format"))),
        force_authn: node.attr("ForceAuthn") == Some("true"),
        is_passive: node.attr("IsPassive") == Some("true"),
    })
}

fn logout_request(node: &Node) -> SamlResult<LogoutRequest> {
    Ok(LogoutRequest {
        id: node.required_attr("ID")?.to_string(),
        issue_instant: instant(node.required_attr("IssueInstant")?)?,
        issuer: issuer(node)?,
        destination: owned(node.attr("Destination")),
        name_id: name_id(node),
        not_on_or_after: optional_instant(node, "NotOnOrAfter")?,
        session_indexes: node
            .children_named("SessionIndex")
            .map(|index| index.text().to_string())
            .collect(),
        reason: owned(node.attr("Reason")),
    })
}

fn status(node: &Node) -> SamlResult<Status> {
    let status = node
        .child("Status")
        .ok_or_else(|| SamlError::MissingElement(format!("{}/Status", node.name)))?;
    let code = status
        .child("StatusCode")
        .ok_or_else(|| SamlError::MissingElement("Status/StatusCode".to_string()))?;

    Ok(Status {
        status_code: status_code(code)?,
        status_message: status
            .child("StatusMessage")
            .map(|message| message.text().to_string()),
    })
}

fn status_code(node: &Node) -> SamlResult<StatusCode> {
    Ok(StatusCode {
        value: node.required_attr("Value")?.to_string(),
        nested: node
            .child("StatusCode")
            .map(status_code)
            .transpose()?
            .map(Box::new),
    })
}

fn response(node: &Node) -> SamlResult<Response> {
    let mut assertions = Vec::new();
    for child in &node.children {
        match child.name.as_str() {
            "Assertion" => assertions.push(AssertionKind::Plain(assertion(child)?)),
            "EncryptedAssertion" => {
                assertions.push(AssertionKind::Encrypted(encrypted_assertion(child)?));
            }
            _ => {}
        }
    }

    Ok(Response {
        id: node.required_attr("ID")?.to_string(),
        in_response_to: owned(node.attr("InResponseTo")),
        issue_instant: instant(node.required_attr("IssueInstant")?)?,
        issuer: issuer(node)?,
        destination: owned(node.attr("Destination")),
        status: status(node)?,
        assertions,
    })
}

fn logout_response(node: &Node) -> SamlResult<LogoutResponse> {
    Ok(LogoutResponse {
        id: node.required_attr("ID")?.to_string(),
        in_response_to: owned(node.attr("InResponseTo")),
        issue_instant: instant(node.required_attr("IssueInstant")?)?,
        issuer: issuer(node)?,
        destination: owned(node.attr("Destination")),
        status: status(node)?,
    })
}

fn assertion(node: &Node) -> SamlResult<Assertion> {
    let subject = node.child("Subject").map(subject).transpose()?;

    let conditions = node
        .child("Conditions")
        .map(|conditions| -> SamlResult<Conditions> {
            Ok(Conditions {
                not_before: optional_instant(conditions, "NotBefore")?,
                not_on_or_after: optional_instant(conditions, "NotOnOrAfter")?,
                audiences: conditions
                    .children_named("AudienceRestriction")
                    .flat_map(|restriction| restriction.children_named("Audience"))
                    .map(|audience| audience.text().to_string())
                    .collect(),
            })
        })
        .transpose()?;

    let authn_statement = node
        .child("AuthnStatement")
        .map(|statement| -> SamlResult<AuthnStatement> {
            Ok(AuthnStatement {
                authn_instant: instant(statement.required_attr("AuthnInstant")?)?,
                session_index: owned(statement.attr("SessionIndex")),
                context_class_ref: statement
                    .child("AuthnContext")
                    .and_then(|context| context.child("AuthnContextClassRef"))
                    .map(|class_ref| class_ref.text().to_string())
                    .unwrap_or_default(),
            })
        })
        .transpose()?;

    let attribute_statements = node
        .children_named("AttributeStatement")
        .map(|statement| AttributeStatement {
            attributes: statement
                .children_named("Attribute")
                .filter_map(|attribute| {
                    Some(Attribute {
                        name: attribute.attr("Name")?.to_string(),
                        friendly_name: owned(attribute.attr("FriendlyName")),
                        name_format: owned(attribute.attr("NameFormat")),
                        values: attribute
                            .children_named("AttributeValue")
                            .map(|value| value.text().to_string())
                            .collect(),
                    })
                })
                .collect(),
        })
        .collect();

    Ok(Assertion {
        id: node.required_attr("ID")?.to_string(),
        issue_instant: instant(node.required_attr("IssueInstant")?)?,
        issuer: issuer(node)?,
        subject,
        conditions,
        authn_statement,
        attribute_statements,
    })
}

fn subject(node: &Node) -> SamlResult<Subject> {
    let mut confirmations = Vec::new();
    for confirmation in node.children_named("SubjectConfirmation") {
        let data = confirmation
            .child("SubjectConfirmationData")
            .map(|data| -> SamlResult<SubjectConfirmationData> {
                Ok(SubjectConfirmationData {
                    in_response_to: owned(data.attr("InResponseTo")),
                    recipient: owned(data.attr("Recipient")),
                    not_on_or_after: optional_instant(data, "NotOnOrAfter")?,
                })
            })
            .transpose()?;
        confirmations.push(SubjectConfirmation {
            method: confirmation.required_attr("Method")?.to_string(),
            data,
        });
    }

    Ok(Subject {
        name_id: name_id(node),
        confirmations,
    })
}

fn encrypted_assertion(node: &Node) -> SamlResult<EncryptedAssertion> {
    let data = node
        .child("EncryptedData")
        .ok_or_else(|| SamlError::MissingElement("EncryptedAssertion/EncryptedData".to_string()))?;

    let cipher_value = |parent: &Node| {
        parent
            .child("CipherData")
            .and_then(|cipher| cipher.child("CipherValue"))
            .map(|value| value.text().to_string())
    };

    let encrypted_key = data
        .child("KeyInfo")
        .and_then(|key_info| key_info.child("EncryptedKey"))
        .and_then(|key| {
            Some(EncryptedKey {
                encryption_method: key
                    .child("EncryptionMethod")
                    .and_then(|method| owned(method.attr("Algorithm"))),
                cipher_value: cipher_value(key)?,
            })
        });

    Ok(EncryptedAssertion {
        encryption_method: data
            .child("EncryptionMethod")
            .and_then(|method| owned(method.attr("Algorithm"))),
        encrypted_key,
        cipher_value: cipher_value(data)
            .ok_or_else(|| SamlError::MissingElement("EncryptedData/CipherData".to_string()))?,
    })
}
