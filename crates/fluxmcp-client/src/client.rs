//! Client Facade (spec §4.7): the host-facing surface that owns
//! configuration, constructs the coordinator/catalog/dispatch wiring, and
//! exposes entity accessors plus hook setters. Grounded in the teacher's
//! top-level `Client` (`turbomcp-client/src/client/core.rs`), generalized
//! from a single monolithic struct driving one transport into the
//! Coordinator/Catalog/NotificationRouter/InboundDispatcher split this
//! workspace uses to keep each concern independently testable.

use std::sync::Arc;

use fluxmcp_transport::Transport;

use fluxmcp_protocol::{
    ClientCapabilities, CompletionResult, ElicitationCapability, GetPromptResult,
    InitializeResult, Prompt, Resource, ResourceContents, ResourceTemplate, Result, Root,
    RootsCapability, SamplingCapability, Tool, ToolCallOutcome,
};
use serde_json::Value;

use crate::catalog::Catalog;
use crate::config::ClientConfig;
use crate::coordinator::Coordinator;
use crate::handlers::elicitation::{ElicitationComponent, ElicitationHandler, SchemaValidator};
use crate::handlers::roots::RootsComponent;
use crate::handlers::sampling::{SamplingBackend, SamplingComponent};
use crate::handlers::InboundDispatcher;
use crate::notifications::{LoggingHandler, NotificationRouter, ProgressHandler};
use crate::router::CancelToken;

/// The assembled protocol engine a host application drives: configuration in,
/// entity catalogs and event hooks out.
pub struct Client {
    config: ClientConfig,
    coordinator: Arc<Coordinator>,
    catalog: Arc<Catalog>,
    notifications: Arc<NotificationRouter>,
    roots: Arc<RootsComponent>,
    sampling: Arc<SamplingComponent>,
    elicitation: Arc<ElicitationComponent>,
}

impl Client {
    /// Assemble the coordinator, catalog, notification router, and inbound
    /// dispatch table from `config`, and wire them together. Does not
    /// connect — call [`Self::start`] for that.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::build(Coordinator::new(config.clone()), config)
    }

    /// As [`Self::new`], but over a caller-supplied transport — used by
    /// integration tests that substitute an in-memory duplex pair for the
    /// real network/process transport `config.transport` would otherwise
    /// build.
    #[must_use]
    pub fn new_with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self::build(Coordinator::new_with_transport(transport, config.clone()), config)
    }

    fn build(coordinator: Arc<Coordinator>, config: ClientConfig) -> Self {
        let catalog = Arc::new(Catalog::new(Arc::clone(&coordinator)));
        let notifications = Arc::new(NotificationRouter::new(
            Arc::clone(&catalog),
            config.logging_level,
        ));

        let roots = Arc::new(RootsComponent::new(config.roots.clone()));
        let sampling = Arc::new(SamplingComponent::new(config.sampling.clone(), None));
        let elicitation = ElicitationComponent::new(config.elicitation_timeout);
        elicitation.attach_router(coordinator.router());

        let inbound = Arc::new(InboundDispatcher {
            roots: Arc::clone(&roots),
            sampling: Arc::clone(&sampling),
            elicitation: Arc::clone(&elicitation),
        });
        coordinator.install_dispatch(inbound.clone(), notifications.clone(), inbound);

        Self {
            config,
            coordinator,
            catalog,
            notifications,
            roots,
            sampling,
            elicitation,
        }
    }

    /// Build the `ClientCapabilities` advertised during `initialize` from the
    /// currently configured roots/sampling policy.
    fn client_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: (!self.config.roots.is_empty() || !self.roots.list().is_empty())
                .then_some(RootsCapability { list_changed: Some(true) }),
            sampling: self.config.sampling.enabled.then_some(SamplingCapability {}),
            elicitation: Some(ElicitationCapability {}),
        }
    }

    pub async fn start(&self) -> Result<InitializeResult> {
        self.coordinator.start(self.client_capabilities()).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.coordinator.stop().await
    }

    /// `restart` (spec §4.3): rebuild the transport/router, re-initialize,
    /// and flush the catalog (spec §4.3 `restart()`: "catalog is flushed").
    pub async fn restart(&self) -> Result<InitializeResult> {
        self.elicitation.attach_router(self.coordinator.router());
        let result = self.coordinator.restart().await?;
        self.elicitation.attach_router(self.coordinator.router());
        self.catalog.reset_all();
        Ok(result)
    }

    #[must_use]
    pub fn alive(&self) -> bool {
        self.coordinator.alive()
    }

    pub async fn ping(&self) -> bool {
        self.coordinator.ping().await
    }

    // -- Tools -----------------------------------------------------------

    pub async fn tools(&self) -> Result<Vec<Tool>> {
        self.catalog.tools(false).await
    }

    pub async fn tools_refresh(&self) -> Result<Vec<Tool>> {
        self.catalog.tools(true).await
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Tool> {
        self.catalog.tool(name)
    }

    pub fn reset_tools(&self) {
        self.catalog.flush_tools();
    }

    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutcome> {
        self.coordinator.execute_tool(name, arguments).await
    }

    /// As [`Self::execute_tool`], but `cancel` lets the host abort a stalled
    /// call (spec §8 scenario 3).
    pub async fn execute_tool_cancellable(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancelToken,
    ) -> Result<ToolCallOutcome> {
        self.coordinator
            .execute_tool_cancellable(name, arguments, cancel)
            .await
    }

    // -- Resources ---------------------------------------------------------

    pub async fn resources(&self) -> Result<Vec<Resource>> {
        self.catalog.resources(false).await
    }

    pub async fn resources_refresh(&self) -> Result<Vec<Resource>> {
        self.catalog.resources(true).await
    }

    #[must_use]
    pub fn resource(&self, uri: &str) -> Option<Resource> {
        self.catalog.resource(uri)
    }

    pub fn reset_resources(&self) {
        self.catalog.flush_resources();
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        self.catalog.content(uri).await
    }

    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        self.coordinator.subscribe_resource(uri).await
    }

    // -- Resource templates ------------------------------------------------

    pub async fn resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.catalog.resource_templates(false).await
    }

    pub async fn resource_templates_refresh(&self) -> Result<Vec<ResourceTemplate>> {
        self.catalog.resource_templates(true).await
    }

    #[must_use]
    pub fn resource_template(&self, uri_template: &str) -> Option<ResourceTemplate> {
        self.catalog.resource_template(uri_template)
    }

    pub fn reset_resource_templates(&self) {
        self.catalog.flush_resource_templates();
    }

    // -- Prompts -------------------------------------------------------------

    pub async fn prompts(&self) -> Result<Vec<Prompt>> {
        self.catalog.prompts(false).await
    }

    pub async fn prompts_refresh(&self) -> Result<Vec<Prompt>> {
        self.catalog.prompts(true).await
    }

    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<Prompt> {
        self.catalog.prompt(name)
    }

    pub fn reset_prompts(&self) {
        self.catalog.flush_prompts();
    }

    pub async fn execute_prompt(
        &self,
        name: &str,
        arguments: Option<std::collections::HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.coordinator.execute_prompt(name, arguments).await
    }

    pub async fn completion(
        &self,
        reference: Value,
        argument_name: &str,
        argument_value: &str,
    ) -> Result<CompletionResult> {
        self.coordinator
            .completion(reference, argument_name, argument_value)
            .await
    }

    // -- Roots ---------------------------------------------------------------

    #[must_use]
    pub fn roots(&self) -> Vec<Root> {
        self.roots.list()
    }

    pub fn add_root(&self, root: Root) {
        self.roots.add(root);
    }

    pub fn remove_root(&self, uri: &str) -> bool {
        self.roots.remove(uri)
    }

    // -- Hooks -----------------------------------------------------------

    pub fn on_progress(&self, handler: Arc<dyn ProgressHandler>) {
        self.notifications.set_progress_handler(handler);
    }

    pub fn on_logging(&self, handler: Arc<dyn LoggingHandler>) {
        self.notifications.set_logging_handler(handler);
    }

    pub fn set_logging_level(&self, level: fluxmcp_protocol::LogLevel) {
        self.notifications.set_logging_level(level);
    }

    pub fn on_sampling(&self, backend: Arc<dyn SamplingBackend>) {
        self.sampling.set_backend(backend);
    }

    pub fn on_elicitation(&self, handler: Arc<dyn ElicitationHandler>) {
        self.elicitation.set_handler(handler);
    }

    /// Alias for [`Self::on_elicitation`]: the spec's glossary treats
    /// "ElicitationHandler" and "HumanInTheLoopHandler" as the same seam.
    pub fn on_human_in_the_loop(&self, handler: Arc<dyn ElicitationHandler>) {
        self.on_elicitation(handler);
    }

    pub fn set_elicitation_validator(&self, validator: Arc<dyn SchemaValidator>) {
        self.elicitation.set_validator(validator);
    }

    /// Complete a deferred elicitation externally (spec §8 scenario 6).
    pub async fn complete_elicitation(&self, id: fluxmcp_protocol::RequestId, data: Value) -> Result<()> {
        self.elicitation.complete(id, data).await
    }

    /// Cancel a single in-flight outbound request via a [`CancelToken`]
    /// obtained before issuing it (spec §8 scenario 3).
    #[must_use]
    pub fn cancel_token() -> CancelToken {
        CancelToken::new()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_have_elicitation_only() {
        let client = Client::new(ClientConfig::default());
        let caps = client.client_capabilities();
        assert!(caps.elicitation.is_some());
        assert!(caps.roots.is_none());
        assert!(caps.sampling.is_none());
    }

    #[test]
    fn roots_capability_follows_configured_roots() {
        let config = ClientConfig::default().with_roots(vec![Root {
            uri: "file:///tmp".to_string(),
            name: None,
        }]);
        let client = Client::new(config);
        assert!(client.client_capabilities().roots.is_some());
    }

    #[test]
    fn adding_a_root_at_runtime_is_reflected_in_the_list() {
        let client = Client::new(ClientConfig::default());
        assert!(client.roots().is_empty());
        client.add_root(Root {
            uri: "file:///a".to_string(),
            name: None,
        });
        assert_eq!(client.roots().len(), 1);
        assert!(client.remove_root("file:///a"));
    }

    #[tokio::test]
    async fn sampling_backend_can_be_installed_after_construction() {
        use crate::handlers::sampling::SamplingBackend;
        use async_trait::async_trait;
        use fluxmcp_protocol::{SamplingContent, SamplingMessage, SamplingRole};

        struct Echo;
        #[async_trait]
        impl SamplingBackend for Echo {
            async fn create_message(
                &self,
                _model: &str,
                _system_prompt: Option<&str>,
                messages: &[SamplingMessage],
                _max_tokens: u32,
            ) -> Result<SamplingMessage> {
                Ok(messages.last().cloned().unwrap())
            }
        }

        let mut config = ClientConfig::default();
        config.sampling.enabled = true;
        let client = Client::new(config);
        client.on_sampling(Arc::new(Echo));

        let params = serde_json::json!({
            "messages": [{"role":"user","content":{"type":"text","text":"hi"}}],
            "maxTokens": 10,
        });
        let response = client
            .sampling
            .handle(fluxmcp_protocol::RequestId::Number(1), Some(params))
            .await;
        assert!(response.error().is_none());
    }
}
