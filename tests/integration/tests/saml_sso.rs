//! SAML browser SSO between an SP and the IDP.

use std::collections::HashMap;
use std::sync::Arc;

use pl_protocol_saml::bindings::{HttpPostBinding, SamlMessageType};
use pl_protocol_saml::handlers::{GenerateRequestType, Outbound};
use pl_protocol_saml::{IdentityParticipantStack, SamlError, SamlMessage};
use pl_session::{keys, HttpSession};

use crate::common::{self, IDP_URL, SP_URL};

/// Re-posts `answer` after rewriting its XML.
fn tampered(answer: &Outbound, from: &str, to: &str) -> anyhow::Result<Outbound> {
    let decoded = common::deliver(answer)?;
    let xml = decoded.xml.replace(from, to);
    anyhow::ensure!(xml != decoded.xml, "nothing to tamper with");
    Ok(Outbound::Post(HttpPostBinding::encode(
        &xml,
        SP_URL,
        None,
        SamlMessageType::Response,
    )))
}

#[tokio::test]
async fn sso_over_post_binding() -> anyhow::Result<()> {
    common::init_tracing();
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sp_session = Arc::new(HttpSession::new());

    let (answer, verdict) = common::single_sign_on(&idp, &sp, &idp_session, &sp_session, true).await?;

    assert!(matches!(answer, Outbound::Post(_)));
    assert_eq!(common::destination(&answer), SP_URL);
    verdict.outcome?;
    assert_eq!(verdict.response.error, None);
    assert_eq!(verdict.response.roles, vec!["manager".to_string()]);

    assert_eq!(sp_session.string_attribute(keys::PRINCIPAL_ID).as_deref(), Some("tomcat"));
    let roles: Vec<String> = sp_session.attribute(keys::ROLES)?.unwrap_or_default();
    assert_eq!(roles, vec!["manager".to_string()]);
    assert!(!sp_session.contains_attribute(keys::AUTH_REQUEST_ID));

    let attributes: HashMap<String, Vec<String>> = sp_session
        .attribute(keys::SESSION_ATTRIBUTE_MAP)?
        .unwrap_or_default();
    assert_eq!(attributes.get("email"), Some(&vec!["tomcat@example.com".to_string()]));
    assert!(!attributes.contains_key("department"));

    assert!(idp_session.contains_attribute(keys::ASSERTION));
    assert_eq!(idp.identity_server.participants(idp_session.id()), 1);
    assert_eq!(idp.identity_server.binding(SP_URL), Some(true));
    Ok(())
}

#[tokio::test]
async fn sso_over_redirect_binding() -> anyhow::Result<()> {
    common::init_tracing();
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["employee"])?;
    let sp_session = Arc::new(HttpSession::new());

    let authn_request = sp
        .generate(&sp_session, GenerateRequestType::Authentication, false)
        .await?;
    let Outbound::Redirect(url) = &authn_request else {
        anyhow::bail!("expected a redirect to the IDP");
    };
    assert!(url.starts_with(IDP_URL));
    assert!(url.contains("&Signature="));

    let issued = idp.provider.receive(&idp_session, &authn_request).await?;
    let answer = issued.reply()?;
    assert!(matches!(answer, Outbound::Redirect(_)));
    assert_eq!(common::destination(&answer), SP_URL);
    assert_eq!(idp.identity_server.binding(SP_URL), Some(false));

    let verdict = sp.receive(&sp_session, &answer).await?;
    verdict.outcome?;
    assert_eq!(sp_session.string_attribute(keys::PRINCIPAL_ID).as_deref(), Some("tomcat"));
    Ok(())
}

#[tokio::test]
async fn authn_request_names_the_sp() -> anyhow::Result<()> {
    let sp = common::sp(SP_URL)?;
    let session = Arc::new(HttpSession::new());

    let outbound = sp
        .generate(&session, GenerateRequestType::Authentication, true)
        .await?;
    assert_eq!(common::destination(&outbound), IDP_URL);

    let decoded = common::deliver(&outbound)?;
    assert!(decoded.xml.contains("<ds:Signature"));
    let SamlMessage::AuthnRequest(request) = pl_protocol_saml::parser::parse(&decoded.xml)? else {
        anyhow::bail!("expected an AuthnRequest");
    };
    assert_eq!(request.issuer, SP_URL);
    assert_eq!(request.assertion_consumer_service_url.as_deref(), Some(SP_URL));
    assert_eq!(
        session.string_attribute(keys::AUTH_REQUEST_ID).as_deref(),
        Some(request.id.as_str())
    );
    Ok(())
}

#[tokio::test]
async fn tampered_response_is_rejected() -> anyhow::Result<()> {
    common::init_tracing();
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sp_session = Arc::new(HttpSession::new());

    let authn_request = sp
        .generate(&sp_session, GenerateRequestType::Authentication, true)
        .await?;
    let answer = idp.provider.receive(&idp_session, &authn_request).await?.reply()?;

    let forged = tampered(&answer, ">tomcat<", ">admin<")?;
    let rejected = sp.receive(&sp_session, &forged).await?;
    let Err(err) = rejected.outcome else {
        anyhow::bail!("forged response was accepted");
    };
    assert!(matches!(err.root_cause(), SamlError::SignatureValidation(_)));
    assert_eq!(rejected.response.error.map(|e| e.code), Some(403));
    assert!(!sp_session.contains_attribute(keys::PRINCIPAL_ID));

    // The genuine answer still goes through.
    sp.receive(&sp_session, &answer).await?.outcome?;
    assert_eq!(sp_session.string_attribute(keys::PRINCIPAL_ID).as_deref(), Some("tomcat"));
    Ok(())
}

#[tokio::test]
async fn response_from_untrusted_issuer_is_rejected() -> anyhow::Result<()> {
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sp_session = Arc::new(HttpSession::new());

    let authn_request = sp
        .generate(&sp_session, GenerateRequestType::Authentication, true)
        .await?;
    let answer = idp.provider.receive(&idp_session, &authn_request).await?.reply()?;

    let forged = tampered(&answer, IDP_URL, "https://idp.attacker.net/idp/")?;
    let rejected = sp.receive(&sp_session, &forged).await?;
    let Err(err) = rejected.outcome else {
        anyhow::bail!("response from an untrusted issuer was accepted");
    };
    assert!(matches!(err.root_cause(), SamlError::IssuerNotTrusted(_)));
    assert_eq!(err.http_status(), 403);
    Ok(())
}

#[tokio::test]
async fn replayed_response_is_rejected() -> anyhow::Result<()> {
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sp_session = Arc::new(HttpSession::new());

    let (answer, verdict) = common::single_sign_on(&idp, &sp, &idp_session, &sp_session, true).await?;
    verdict.outcome?;

    let replay = sp.receive(&sp_session, &answer).await?;
    let Err(err) = replay.outcome else {
        anyhow::bail!("replayed response was accepted");
    };
    assert!(matches!(
        err.root_cause(),
        SamlError::InResponseToMismatch { expected: None, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn user_without_allowed_role_is_forbidden() -> anyhow::Result<()> {
    let idp = common::idp()?;
    let sp = common::sp(SP_URL)?;
    let idp_session = common::idp_login("guest", &["visitor"])?;
    let sp_session = Arc::new(HttpSession::new());

    let (_, verdict) = common::single_sign_on(&idp, &sp, &idp_session, &sp_session, true).await?;

    verdict.outcome?;
    let error = verdict.response.error.clone();
    assert_eq!(error.map(|e| e.code), Some(403));
    assert!(!sp_session.contains_attribute(keys::PRINCIPAL_ID));
    Ok(())
}
