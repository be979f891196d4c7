//! Attribute release (IDP) and attribute collection (SP).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pl_session::keys;

use crate::error::{SamlError, SamlResult};
use crate::types::{RequestMessage, SamlMessage, StatusResponseMessage};

use super::{
    params, AttributeManager, ChainConfig, EmptyAttributeManager, HandlerConfig, HandlerRole,
    ProviderConfig, SamlHandler, SamlHandlerRequest, SamlHandlerResponse,
};

/// Moves user attributes between the attribute manager, the session and
/// the assertion.
pub struct AttributeHandler {
    config: Arc<ChainConfig>,
    manager: Arc<dyn AttributeManager>,
    attribute_keys: Vec<String>,
    choose_friendly_name: bool,
}

impl AttributeHandler {
    /// Creates the handler.
    ///
    /// The attribute manager is the one named by `ATTIBUTE_MANAGER`, else
    /// the one named in the IDP settings, else one that releases nothing.
    /// Naming a manager the chain does not know is a configuration error.
    pub fn new(config: Arc<ChainConfig>, params: HandlerConfig) -> SamlResult<Self> {
        let idp_default = match &config.provider {
            ProviderConfig::Idp(idp) => idp.attribute_manager.as_deref(),
            ProviderConfig::Sp(_) => None,
        };
        let manager: Arc<dyn AttributeManager> =
            match params.parameter(params::ATTIBUTE_MANAGER).or(idp_default) {
                Some(name) => config.attribute_managers.get(name).cloned().ok_or_else(|| {
                    SamlError::Configuration(format!("Unknown attribute manager '{name}'"))
                })?,
                None => Arc::new(EmptyAttributeManager),
            };

        Ok(Self {
            manager,
            attribute_keys: params.list(params::ATTRIBUTE_KEYS),
            choose_friendly_name: params.flag(params::ATTRIBUTE_CHOOSE_FRIENDLY_NAME),
            config,
        })
    }

    async fn release(&self, request: &mut SamlHandlerRequest) -> SamlResult<()> {
        let session = &request.session;
        let attributes = match session.attribute::<HashMap<String, Vec<String>>>(keys::ATTRIBUTES)? {
            Some(attributes) => attributes,
            None => {
                let principal = session
                    .string_attribute(keys::PRINCIPAL_ID)
                    .or_else(|| request.user_principal.clone())
                    .unwrap_or_default();
                let attributes = self.manager.attributes(&principal, &self.attribute_keys).await?;
                tracing::debug!(%principal, count = attributes.len(), "attributes loaded");
                session.set_attribute(keys::ATTRIBUTES, &attributes)?;
                attributes
            }
        };
        if request.options.attributes.is_none() {
            request.options.attributes = Some(attributes);
        }
        Ok(())
    }

    fn collect(&self, request: &SamlHandlerRequest) -> SamlResult<()> {
        let assertion = request.options.assertion.as_ref().ok_or_else(|| {
            SamlError::processing("Assertion not found in the handler request")
        })?;

        let session = &request.session;
        let mut collected: HashMap<String, Vec<String>> = session
            .attribute(keys::SESSION_ATTRIBUTE_MAP)?
            .unwrap_or_default();
        for attribute in assertion.attributes() {
            let key = if self.choose_friendly_name {
                attribute.friendly_name.as_ref().unwrap_or(&attribute.name)
            } else {
                &attribute.name
            };
            collected.insert(key.clone(), attribute.values.clone());
        }
        session.set_attribute(keys::SESSION_ATTRIBUTE_MAP, &collected)?;
        Ok(())
    }
}

#[async_trait]
impl SamlHandler for AttributeHandler {
    fn name(&self) -> &'static str {
        "attribute"
    }

    async fn handle_request_type(
        &self,
        request: &mut SamlHandlerRequest,
        _response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if self.config.role() != HandlerRole::Idp
            || matches!(
                request.message.as_ref().and_then(SamlMessage::as_request),
                Some(RequestMessage::LogoutRequest(_))
            )
        {
            return Ok(());
        }
        self.release(request).await
    }

    async fn handle_status_response_type(
        &self,
        request: &mut SamlHandlerRequest,
        response: &mut SamlHandlerResponse,
    ) -> SamlResult<()> {
        if self.config.role() != HandlerRole::Sp
            || !matches!(
                request.message.as_ref().and_then(SamlMessage::as_status_response),
                Some(StatusResponseMessage::Response(_))
            )
            || response.error.is_some()
        {
            return Ok(());
        }
        self.collect(request)
    }
}
