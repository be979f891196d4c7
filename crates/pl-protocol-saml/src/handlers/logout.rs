//! Single logout.
//!
//! The IDP keeps, per session, the stack of service providers it issued
//! assertions to. A logout started at one of them is relayed to every other
//! participant in turn, with the originator carried in `RelayState`, and
//! only then answered with a success status.

use std::sync::Arc;

use async_trait::async_trait;
use pl_core::{AuditEvent, AuditEventType};
use pl_session::{keys, HttpSession};

use crate::error::{SamlError, SamlResult};
use crate::identity_server::IdentityParticipantStack;
use crate::types::{
    status_codes, Assertion, LogoutRequest, LogoutResponse, NameId, RequestMessage, SamlMessage,
    StatusResponseMessage,
};

use super::authentication::who_is_auditing;
use super::{
    ChainConfig, GenerateRequestType, HandlerConfig, HandlerRole, ProviderConfig, SamlHandler,
    SamlHandlerRequest, SamlHandlerResponse,
};

/// Runs the logout protocol for both sides.
pub struct LogoutHandler {
    config: Arc<ChainConfig>,
}

impl LogoutHandler {
    /// Creates the handler.
    pub fn new(config: Arc<ChainConfig>, _params: HandlerConfig) -> SamlResult<Self> {
        Ok(Self { config })
    }

    /// Pops the stack until a participant other than `originator` comes
    /// up or the stack runs dry. Returns `originator` when the stack was
    /// empty to begin with.
    fn next_participant(
        server: &dyn IdentityParticipantStack,
        session_id: &str,
        originator: &str,
    ) -> Option<String> {
        let mut remaining = server.participants(session_id);
        if remaining == 0 {
            return Some(originator.to_string());
        }
        loop {
            let participant = server.pop(session_id);
            remaining -= 1;
            if remaining == 0 || participant.as_deref() != Some(originator) {
                return participant;
            }
        }
    }

    fn post_binding(&self, server: &dyn IdentityParticipantStack, participant: Option<&str>) -> bool {
        let recorded = participant.and_then(|p| server.binding(p)).unwrap_or(true);
        recorded || self.config.saml.strict_post_binding
    }

    fn principal(request: &SamlHandlerRequest) -> Option<String> {
        request
            .session
            .string_attribute(keys::PRINCIPAL_ID)
            .or_else(|| request.user_principal.clone())
    }

    /// A `LogoutRequest` to `participant` that expires with the token
    /// service timeout.
    fn participant_request(
        &self,
        request: &SamlHandlerRequest,
        participant: &str,
        name_id: Option<String>,
    ) -> SamlResult<LogoutRequest> {
        let timeout = match &self.config.sts {
            Some(sts) => sts.issued_token_timeout(),
            None => self.config.saml.sts_token_timeout(),
        };
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| SamlError::Configuration(format!("Invalid token timeout: {e}")))?;

        let mut logout = LogoutRequest::new(&request.issuer).with_destination(participant);
        logout.not_on_or_after = Some(logout.issue_instant + timeout);
        if let Some(name) = name_id {
            logout = logout.with_name_id(NameId::new(name));
        }
        Ok(logout)
    }

    /// Cancels the session's assertion at the token service.
    async fn cancel_session_token(&self, session: &HttpSession) -> SamlResult<()> {
        let Some(assertion) = session.take_attribute::<Assertion>(keys::ASSERTION)? else {
            return Ok(());
        };
        match &self.config.sts {
            Some(sts) => sts.cancel_token(&assertion).await,
            None => {
                tracing::debug!(assertion_id = %assertion.id, "no token service to cancel against");
                Ok(())
            }
        }
    }

    async fn idp_logout_request(
        &self,
        logout: &LogoutRequest,
        request: &SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let server = self.config.require_identity_server()?.as_ref();
        let session_id = request.session.id().to_string();
        let originator = request
            .relay_state
            .clone()
            .unwrap_or_else(|| logout.issuer.clone());

        let participant = Self::next_participant(server, &session_id, &originator);
        match participant {
            Some(next) if next != originator => {
                server.register_transit_participant(&session_id, &next);
                let name_id = Self::principal(request).ok_or_else(|| {
                    SamlError::processing("No principal to log out of participants")
                })?;
                let relayed = self.participant_request(request, &next, Some(name_id))?;
                tracing::debug!(session = %session_id, participant = %next, "relaying logout");

                response.set_message(&SamlMessage::LogoutRequest(relayed))?;
                response.post_binding = self.post_binding(server, Some(next.as_str()));
                response.destination = Some(next);
                response.relay_state = Some(originator);
                response.send_request = true;
            }
            participant => {
                tracing::debug!(session = %session_id, %originator, "logout complete");
                self.cancel_session_token(&request.session).await?;
                request.session.invalidate();
                server.remove_session(&session_id);

                let reply = LogoutResponse::success(&request.issuer)
                    .in_response_to(Some(logout.id.clone()))
                    .with_destination(&originator);
                response.set_message(&SamlMessage::LogoutResponse(reply))?;
                response.post_binding = self.post_binding(server, participant.as_deref());
                response.destination = Some(originator);
                response.send_request = false;
            }
        }
        Ok(())
    }

    async fn idp_logout_response(
        &self,
        logout: &LogoutResponse,
        request: &SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let server = self.config.require_identity_server()?.as_ref();
        let session = &request.session;
        let session_id = session.id().to_string();
        server.deregister_transit_participant(&session_id, &logout.issuer);

        let originator = request.relay_state.clone().ok_or_else(|| {
            SamlError::processing("Logout response without the originator in RelayState")
        })?;

        match Self::next_participant(server, &session_id, &originator) {
            Some(next) if next != originator => {
                server.register_transit_participant(&session_id, &next);
                let relayed = self.participant_request(request, &next, Self::principal(request))?;
                tracing::debug!(session = %session_id, participant = %next, "relaying logout");

                response.set_message(&SamlMessage::LogoutRequest(relayed))?;
                response.post_binding = self.post_binding(server, Some(next.as_str()));
                response.destination = Some(next);
                response.relay_state = Some(originator);
                response.send_request = true;
            }
            _ => {
                tracing::debug!(session = %session_id, %originator, "logout complete");
                self.cancel_session_token(session).await?;

                let reply = LogoutResponse::success(&request.issuer)
                    .in_response_to(logout.in_response_to.clone())
                    .with_destination(&originator);
                response.set_message(&SamlMessage::LogoutResponse(reply))?;
                response.post_binding = self.post_binding(server, Some(originator.as_str()));
                response.destination = Some(originator);
                response.send_request = false;

                self.config.audit(
                    &AuditEvent::builder(AuditEventType::InvalidateHttpSession)
                        .who_is_auditing(who_is_auditing(&request.options, &request.issuer))
                        .session(&session_id)
                        .build(),
                );
                session.invalidate();
                server.remove_session(&session_id);
            }
        }
        Ok(())
    }

    fn sp_generate(
        &self,
        request: &SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let ProviderConfig::Sp(sp) = &self.config.provider else {
            return Ok(());
        };
        let principal = Self::principal(request)
            .ok_or_else(|| SamlError::processing("No principal to log out"))?;
        let destination = response
            .destination
            .clone()
            .unwrap_or_else(|| sp.identity_url.clone());

        let logout = LogoutRequest::new(&request.issuer)
            .with_destination(&destination)
            .with_name_id(NameId::new(principal));
        response.set_message(&SamlMessage::LogoutRequest(logout))?;
        response.destination = Some(destination);
        response.send_request = true;
        Ok(())
    }

    fn sp_logout_request(
        logout: &LogoutRequest,
        request: &SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        request.session.invalidate();

        let reply = LogoutResponse::success(&request.issuer)
            .in_response_to(Some(logout.id.clone()))
            .with_destination(&logout.issuer);
        response.set_message(&SamlMessage::LogoutResponse(reply))?;
        response.relay_state = request.relay_state.clone();
        response.destination = Some(logout.issuer.clone());
        response.send_request = false;
        Ok(())
    }

    fn sp_logout_response(logout: &LogoutResponse, request: &SamlHandlerRequest) {
        let status = &logout.status;
        if status.is_success() || status.second_level_value() == Some(status_codes::SUCCESS) {
            request.session.invalidate();
        } else {
            tracing::warn!(
                status = %status.status_code.value,
                "logout response without success status, session kept"
            );
        }
    }
}

#[async_trait]
impl SamlHandler for LogoutHandler {
    fn name(&self) -> &'static str {
        "logout"
    }

    async fn generate_saml_request(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if request.request_type != Some(GenerateRequestType::Logout) {
            return Ok(());
        }
        match self.config.role() {
            HandlerRole::Idp => Ok(()),
            HandlerRole::Sp => self.sp_generate(request, response),
        }
    }

    async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let Some(RequestMessage::LogoutRequest(logout)) =
            request.message.as_ref().and_then(SamlMessage::as_request)
        else {
            return Ok(());
        };
        match self.config.role() {
            HandlerRole::Idp => self.idp_logout_request(logout, request, response).await,
            HandlerRole::Sp => Self::sp_logout_request(logout, request, response),
        }
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        let Some(StatusResponseMessage::LogoutResponse(logout)) =
            request.message.as_ref().and_then(SamlMessage::as_status_response)
        else {
            return Ok(());
        };
        match self.config.role() {
            HandlerRole::Idp => self.idp_logout_response(logout, request, response).await,
            HandlerRole::Sp => {
                Self::sp_logout_response(logout, request);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pl_core::config::SamlConfig;

    use crate::handlers::testing::{self, IDP_URL, SP2_URL, SP_URL};
    use crate::handlers::{IdpConfig, SpConfig};
    use crate::identity_server::IdentityServer;
    use crate::sts::LocalTokenService;

    const SP1: &str = "https://sp1.example.com/";
    const SP2: &str = "https://sp2.example.com/";
    const SP3: &str = "https://sp3.example.com/";

    /// A participant stack seeded with a fixed list.
    #[derive(Default)]
    struct FixedStack {
        stack: Mutex<Vec<String>>,
        in_transit: Mutex<Vec<String>>,
    }

    impl FixedStack {
        fn with(participants: &[&str]) -> Self {
            Self {
                stack: Mutex::new(participants.iter().map(ToString::to_string).collect()),
                in_transit: Mutex::default(),
            }
        }
    }

    impl IdentityParticipantStack for FixedStack {
        fn peek(&self, _session_id: &str) -> Option<String> {
            self.stack.lock().last().cloned()
        }
        fn pop(&self, _session_id: &str) -> Option<String> {
            self.stack.lock().pop()
        }
        fn register(&self, _session_id: &str, participant: &str, _post_binding: bool) {
            self.stack.lock().push(participant.to_string());
        }
        fn participants(&self, _session_id: &str) -> usize {
            self.stack.lock().len()
        }
        fn register_transit_participant(&self, _session_id: &str, participant: &str) -> bool {
            self.in_transit.lock().push(participant.to_string());
            true
        }
        fn deregister_transit_participant(&self, _session_id: &str, participant: &str) -> bool {
            let mut in_transit = self.in_transit.lock();
            let before = in_transit.len();
            in_transit.retain(|p| p != participant);
            in_transit.len() != before
        }
        fn participants_in_transit(&self, _session_id: &str) -> usize {
            self.in_transit.lock().len()
        }
        fn binding(&self, _participant: &str) -> Option<bool> {
            None
        }
        fn total_sessions(&self) -> usize {
            1
        }
        fn create_session(&self, _session_id: &str) {}
        fn remove_session(&self, _session_id: &str) {}
    }

    fn logged_in_session() -> Arc<HttpSession> {
        let session = Arc::new(HttpSession::new());
        session.set_attribute(keys::PRINCIPAL_ID, "tomcat").unwrap();
        session
            .set_attribute(keys::ASSERTION, &Assertion::with_id("ID_issued", IDP_URL))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn logout_fans_out_to_every_other_participant() {
        let stack = Arc::new(FixedStack::with(&[SP1, SP2, SP3]));
        let sts = Arc::new(LocalTokenService::new(std::time::Duration::from_secs(5)));
        let config = Arc::new(
            ChainConfig::idp(IdpConfig::new(IDP_URL))
                .with_identity_server(stack.clone())
                .with_sts(sts.clone()),
        );
        let handler = LogoutHandler::new(config, HandlerConfig::new()).unwrap();
        let session = logged_in_session();

        let initiating = LogoutRequest::new(SP3).with_name_id(NameId::new("tomcat"));
        let mut request = testing::inbound(&session, IDP_URL, SamlMessage::LogoutRequest(initiating));
        let mut response = SamlHandlerResponse::new();
        handler.handle_request_type(&mut request, &mut response).await.unwrap();

        let mut relayed_to = Vec::new();
        while response.send_request {
            let participant = response.destination.clone().unwrap();
            let Some(SamlMessage::LogoutRequest(relayed)) = response.message().unwrap() else {
                panic!("expected a LogoutRequest");
            };
            assert_eq!(relayed.name_id.map(|n| n.value).as_deref(), Some("tomcat"));
            assert!(relayed.not_on_or_after.is_some());
            assert_eq!(stack.participants_in_transit("s"), 1);
            relayed_to.push(participant.clone());

            let answer = LogoutResponse::success(&participant).in_response_to(Some(relayed.id));
            let mut next = testing::inbound(&session, IDP_URL, SamlMessage::LogoutResponse(answer));
            next.relay_state = response.relay_state.clone();
            response = SamlHandlerResponse::new();
            handler.handle_status_response_type(&mut next, &mut response).await.unwrap();
        }

        assert_eq!(relayed_to, vec![SP2, SP1]);
        assert_eq!(response.destination.as_deref(), Some(SP3));
        let Some(SamlMessage::LogoutResponse(done)) = response.message().unwrap() else {
            panic!("expected a LogoutResponse");
        };
        assert_eq!(done.status.second_level_value(), Some(status_codes::SUCCESS));
        assert!(session.is_invalidated());
        assert!(sts.is_revoked("ID_issued"));
        assert_eq!(stack.participants_in_transit("s"), 0);
    }

    #[tokio::test]
    async fn lone_participant_is_answered_directly() {
        let fixture = testing::idp_fixture();
        let handler = LogoutHandler::new(fixture.config.clone(), HandlerConfig::new()).unwrap();
        let session = logged_in_session();
        fixture.identity_server.register(session.id(), SP_URL, true);

        let initiating = LogoutRequest::new(SP_URL);
        let request_id = initiating.id.clone();
        let mut request = testing::inbound(&session, IDP_URL, SamlMessage::LogoutRequest(initiating));
        let mut response = SamlHandlerResponse::new();
        handler.handle_request_type(&mut request, &mut response).await.unwrap();

        let Some(SamlMessage::LogoutResponse(done)) = response.message().unwrap() else {
            panic!("expected a LogoutResponse");
        };
        assert_eq!(done.in_response_to.as_deref(), Some(request_id.as_str()));
        assert_eq!(done.status.status_code.value, status_codes::RESPONDER);
        assert!(!response.send_request);
        assert!(session.is_invalidated());
        assert!(fixture.sts.is_revoked("ID_issued"));
        assert_eq!(fixture.identity_server.total_sessions(), 0);
    }

    #[tokio::test]
    async fn relayed_request_uses_recorded_binding_unless_strict() {
        for (strict, expected_post) in [(false, false), (true, true)] {
            let server = Arc::new(IdentityServer::new());
            let config = Arc::new(
                ChainConfig::idp(IdpConfig::new(IDP_URL))
                    .with_identity_server(server.clone())
                    .with_saml(SamlConfig {
                        strict_post_binding: strict,
                        ..SamlConfig::default()
                    }),
            );
            let handler = LogoutHandler::new(config, HandlerConfig::new()).unwrap();
            let session = logged_in_session();
            server.register(session.id(), SP2_URL, false);
            server.register(session.id(), SP_URL, true);

            let mut request = testing::inbound(
                &session,
                IDP_URL,
                SamlMessage::LogoutRequest(LogoutRequest::new(SP_URL)),
            );
            let mut response = SamlHandlerResponse::new();
            handler.handle_request_type(&mut request, &mut response).await.unwrap();

            assert_eq!(response.destination.as_deref(), Some(SP2_URL));
            assert_eq!(response.relay_state.as_deref(), Some(SP_URL));
            assert_eq!(response.post_binding, expected_post);
            assert!(!session.is_invalidated());
        }
    }

    #[tokio::test]
    async fn idp_logout_response_requires_relay_state() {
        let fixture = testing::idp_fixture();
        let handler = LogoutHandler::new(fixture.config, HandlerConfig::new()).unwrap();
        let mut request = testing::inbound(
            &logged_in_session(),
            IDP_URL,
            SamlMessage::LogoutResponse(LogoutResponse::success(SP_URL)),
        );
        assert!(handler
            .handle_status_response_type(&mut request, &mut SamlHandlerResponse::new())
            .await
            .is_err());
    }

    fn sp_handler() -> LogoutHandler {
        let config = ChainConfig::sp(SpConfig::new(SP_URL, IDP_URL));
        LogoutHandler::new(Arc::new(config), HandlerConfig::new()).unwrap()
    }

    #[tokio::test]
    async fn sp_generates_logout_request_for_principal() {
        let handler = sp_handler();
        let mut request =
            SamlHandlerRequest::generate(logged_in_session(), SP_URL, GenerateRequestType::Logout);
        let mut response = SamlHandlerResponse::new();
        handler.generate_saml_request(&mut request, &mut response).await.unwrap();

        let Some(SamlMessage::LogoutRequest(logout)) = response.message().unwrap() else {
            panic!("expected a LogoutRequest");
        };
        assert_eq!(logout.name_id.map(|n| n.value).as_deref(), Some("tomcat"));
        assert_eq!(response.destination.as_deref(), Some(IDP_URL));
        assert!(response.send_request);

        let mut anonymous = SamlHandlerRequest::generate(
            Arc::new(HttpSession::new()),
            SP_URL,
            GenerateRequestType::Logout,
        );
        assert!(handler
            .generate_saml_request(&mut anonymous, &mut SamlHandlerResponse::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn sp_answers_idp_logout_request() {
        let handler = sp_handler();
        let session = logged_in_session();
        let logout = LogoutRequest::new(IDP_URL);
        let logout_id = logout.id.clone();
        let mut request = testing::inbound(&session, SP_URL, SamlMessage::LogoutRequest(logout));
        request.relay_state = Some(SP2_URL.to_string());
        let mut response = SamlHandlerResponse::new();
        handler.handle_request_type(&mut request, &mut response).await.unwrap();

        assert!(session.is_invalidated());
        assert_eq!(response.destination.as_deref(), Some(IDP_URL));
        assert_eq!(response.relay_state.as_deref(), Some(SP2_URL));
        let Some(SamlMessage::LogoutResponse(reply)) = response.message().unwrap() else {
            panic!("expected a LogoutResponse");
        };
        assert_eq!(reply.in_response_to, Some(logout_id));
    }

    #[tokio::test]
    async fn sp_logout_response_invalidates_on_success_only() {
        let handler = sp_handler();

        let session = logged_in_session();
        let mut request = testing::inbound(
            &session,
            SP_URL,
            SamlMessage::LogoutResponse(LogoutResponse::success(IDP_URL)),
        );
        handler
            .handle_status_response_type(&mut request, &mut SamlHandlerResponse::new())
            .await
            .unwrap();
        assert!(session.is_invalidated());

        let kept = logged_in_session();
        let mut failed = LogoutResponse::success(IDP_URL);
        failed.status = crate::types::Status::responder_error("partial");
        let mut request = testing::inbound(&kept, SP_URL, SamlMessage::LogoutResponse(failed));
        handler
            .handle_status_response_type(&mut request, &mut SamlHandlerResponse::new())
            .await
            .unwrap();
        assert!(!kept.is_invalidated());
    }
}
