//! SAML single logout across the IDP and two SPs.

use std::sync::Arc;

use pl_protocol_saml::handlers::{GenerateRequestType, Outbound};
use pl_protocol_saml::{parser, Assertion, IdentityParticipantStack, SamlMessage};
use pl_session::{keys, HttpSession};

use crate::common::{self, IDP_URL, SP2_URL, SP_URL};

fn message(outbound: &Outbound) -> anyhow::Result<(SamlMessage, Option<String>)> {
    let decoded = common::deliver(outbound)?;
    Ok((parser::parse(&decoded.xml)?, decoded.relay_state))
}

#[tokio::test]
async fn logout_is_relayed_to_every_other_participant() -> anyhow::Result<()> {
    common::init_tracing();
    let idp = common::idp()?;
    let sales = common::sp(SP_URL)?;
    let employee = common::sp(SP2_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sales_session = Arc::new(HttpSession::new());
    let employee_session = Arc::new(HttpSession::new());

    common::single_sign_on(&idp, &sales, &idp_session, &sales_session, true)
        .await?
        .1
        .outcome?;
    common::single_sign_on(&idp, &employee, &idp_session, &employee_session, true)
        .await?
        .1
        .outcome?;
    assert_eq!(idp.identity_server.participants(idp_session.id()), 2);
    let assertion_id = idp_session
        .attribute::<Assertion>(keys::ASSERTION)?
        .map(|assertion| assertion.id)
        .ok_or_else(|| anyhow::anyhow!("IDP session holds no assertion"))?;

    // The employee portal starts the logout.
    let logout = employee
        .generate(&employee_session, GenerateRequestType::Logout, true)
        .await?;
    assert_eq!(common::destination(&logout), IDP_URL);

    // The IDP relays it to the sales portal, remembering who asked.
    let relayed = idp.provider.receive(&idp_session, &logout).await?.reply()?;
    assert_eq!(common::destination(&relayed), SP_URL);
    let (SamlMessage::LogoutRequest(request), relay_state) = message(&relayed)? else {
        anyhow::bail!("expected a LogoutRequest for the sales portal");
    };
    assert_eq!(relay_state.as_deref(), Some(SP2_URL));
    assert_eq!(request.name_id.map(|n| n.value).as_deref(), Some("tomcat"));
    assert!(request.not_on_or_after.is_some());
    assert_eq!(idp.identity_server.participants_in_transit(idp_session.id()), 1);
    assert!(!idp_session.is_invalidated());

    let answered = sales.receive(&sales_session, &relayed).await?.reply()?;
    assert!(sales_session.is_invalidated());
    assert_eq!(common::destination(&answered), IDP_URL);

    // Nobody is left: the IDP answers the employee portal.
    let completed = idp.provider.receive(&idp_session, &answered).await?.reply()?;
    assert_eq!(common::destination(&completed), SP2_URL);
    let (SamlMessage::LogoutResponse(response), _) = message(&completed)? else {
        anyhow::bail!("expected the final LogoutResponse");
    };
    assert_eq!(response.status.second_level_value(), Some(pl_protocol_saml::status_codes::SUCCESS));
    assert!(idp_session.is_invalidated());
    assert!(idp.sts.is_revoked(&assertion_id));
    assert_eq!(idp.identity_server.active_session_count(), 0);

    employee.receive(&employee_session, &completed).await?.outcome?;
    assert!(employee_session.is_invalidated());
    Ok(())
}

#[tokio::test]
async fn lone_participant_is_answered_directly() -> anyhow::Result<()> {
    let idp = common::idp()?;
    let sales = common::sp(SP_URL)?;
    let idp_session = common::idp_login("tomcat", &["manager"])?;
    let sales_session = Arc::new(HttpSession::new());

    common::single_sign_on(&idp, &sales, &idp_session, &sales_session, true)
        .await?
        .1
        .outcome?;

    let logout = sales
        .generate(&sales_session, GenerateRequestType::Logout, true)
        .await?;
    let (SamlMessage::LogoutRequest(request), _) = message(&logout)? else {
        anyhow::bail!("expected a LogoutRequest");
    };

    let answer = idp.provider.receive(&idp_session, &logout).await?.reply()?;
    assert_eq!(common::destination(&answer), SP_URL);
    let (SamlMessage::LogoutResponse(response), _) = message(&answer)? else {
        anyhow::bail!("expected a LogoutResponse");
    };
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    assert!(idp_session.is_invalidated());

    sales.receive(&sales_session, &answer).await?.outcome?;
    assert!(sales_session.is_invalidated());
    Ok(())
}

#[tokio::test]
async fn logout_without_login_is_refused() -> anyhow::Result<()> {
    let sales = common::sp(SP_URL)?;
    let session = Arc::new(HttpSession::new());

    let refused = sales
        .generate(&session, GenerateRequestType::Logout, true)
        .await;
    assert!(refused.is_err());
    assert!(!session.is_invalidated());
    Ok(())
}
