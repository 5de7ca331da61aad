//! Session Coordinator (spec §4.3): lifecycle, capability negotiation,
//! timeouts, pagination, and fork detection, grounded in the teacher's
//! `Client::initialize` / connection lifecycle
//! (`turbomcp-client/src/client/core.rs`,
//! `turbomcp-client/src/client/operations/connection.rs`) generalized from a
//! single always-on client into an explicit `start`/`stop`/`restart`
//! lifecycle with a `ConnectionState`, per the ambient addition in
//! `SPEC_FULL.md` §C grounded in the teacher's `ConnectionState`
//! (`turbomcp-client/src/client/manager.rs`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fluxmcp_protocol::{
    ClientCapabilities, CompletionResult, Content, Error, GetPromptResult, Implementation,
    InitializeResult, Page, Prompt, Resource, ResourceContents, ResourceTemplate, Result,
    ServerCapabilities, Tool, ToolCallOutcome, extract_page,
};
use fluxmcp_transport::Transport;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::router::{CancelToken, InboundCancelSink, MessageRouter, NotificationDispatch, RequestDispatch};

/// Session lifecycle state (spec §3 "Session... Lifecycle:
/// `initializing → ready → closing → closed`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closing,
    Closed,
}

/// How many times [`Coordinator::start`] retries a failed transport
/// connection/`initialize` handshake before giving up, per spec §4.1
/// ("`TransportFailed` is retried only by the caller... using a bounded
/// schedule").
const MAX_START_ATTEMPTS: u32 = 3;

/// Owns the transport, the router, the negotiated capabilities, and the
/// fork-detection pid (spec §4.3 "Fork / process identity"). Shared by
/// `Arc` with the Catalog and Client facade, none of which own its
/// lifecycle (spec §3 ownership note).
pub struct Coordinator {
    transport: RwLock<Arc<dyn Transport>>,
    router: RwLock<Arc<MessageRouter>>,
    config: ClientConfig,
    state: RwLock<ConnectionState>,
    capabilities: RwLock<ServerCapabilities>,
    protocol_version: RwLock<String>,
    pid: AtomicU32,
    /// Remembered so a `restart()` can rewire a freshly built router exactly
    /// as the facade originally configured it.
    request_dispatch: RwLock<Option<Arc<dyn RequestDispatch>>>,
    notification_dispatch: RwLock<Option<Arc<dyn NotificationDispatch>>>,
    cancel_sink: RwLock<Option<Arc<dyn InboundCancelSink>>>,
    client_capabilities: RwLock<ClientCapabilities>,
    /// Correlates this session's log lines across restarts.
    id: uuid::Uuid,
}

impl Coordinator {
    /// Build the transport named by `config.transport` and wrap it in a
    /// fresh router. Call [`Self::install_dispatch`] then [`Self::start`]
    /// before issuing any request.
    #[must_use]
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let transport = fluxmcp_transport::build(config.transport.clone());
        Self::new_with_transport(transport, config)
    }

    /// As [`Self::new`], but over a caller-supplied transport — used by tests
    /// that substitute an in-memory duplex pair for the real network/process
    /// transport `config.transport` would otherwise build.
    #[must_use]
    pub fn new_with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Arc<Self> {
        let router = MessageRouter::new(transport.clone());
        Arc::new(Self {
            transport: RwLock::new(transport),
            router: RwLock::new(router),
            config,
            state: RwLock::new(ConnectionState::Connecting),
            capabilities: RwLock::new(ServerCapabilities::default()),
            protocol_version: RwLock::new(fluxmcp_protocol::PREFERRED_VERSION.to_string()),
            pid: AtomicU32::new(std::process::id()),
            request_dispatch: RwLock::new(None),
            notification_dispatch: RwLock::new(None),
            cancel_sink: RwLock::new(None),
            client_capabilities: RwLock::new(ClientCapabilities::default()),
            id: uuid::Uuid::new_v4(),
        })
    }

    /// Wire the Inbound/Notification dispatch into the router. Must be
    /// called before [`Self::start`]; remembered so [`Self::restart`] can
    /// rewire a freshly built router identically.
    pub fn install_dispatch(
        &self,
        request_dispatch: Arc<dyn RequestDispatch>,
        notification_dispatch: Arc<dyn NotificationDispatch>,
        cancel_sink: Arc<dyn InboundCancelSink>,
    ) {
        self.router().set_request_dispatch(request_dispatch.clone());
        self.router().set_notification_dispatch(notification_dispatch.clone());
        self.router().set_cancel_sink(cancel_sink.clone());
        *self.request_dispatch.write().expect("poisoned") = Some(request_dispatch);
        *self.notification_dispatch.write().expect("poisoned") = Some(notification_dispatch);
        *self.cancel_sink.write().expect("poisoned") = Some(cancel_sink);
    }

    #[must_use]
    pub fn router(&self) -> Arc<MessageRouter> {
        self.router.read().expect("poisoned").clone()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read().expect("poisoned")
    }

    #[must_use]
    pub fn alive(&self) -> bool {
        self.state() == ConnectionState::Ready && self.transport.read().expect("poisoned").alive()
    }

    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        self.capabilities.read().expect("poisoned").clone()
    }

    /// Grant server capabilities directly, skipping the `initialize`
    /// handshake, for tests that only care about what happens after
    /// capability negotiation.
    #[cfg(test)]
    pub(crate) fn set_capabilities_for_test(&self, capabilities: ServerCapabilities) {
        *self.capabilities.write().expect("poisoned") = capabilities;
    }

    #[must_use]
    pub fn protocol_version(&self) -> String {
        self.protocol_version.read().expect("poisoned").clone()
    }

    /// Establish the transport, negotiate the protocol version and
    /// capabilities, and send `notifications/initialized` (spec §4.3
    /// `start()`). Bounded-retries a failing attempt per `MAX_START_ATTEMPTS`.
    pub async fn start(&self, client_capabilities: ClientCapabilities) -> Result<InitializeResult> {
        *self.client_capabilities.write().expect("poisoned") = client_capabilities.clone();
        *self.state.write().expect("poisoned") = ConnectionState::Connecting;

        let mut last_err = None;
        for attempt in 0..MAX_START_ATTEMPTS {
            match self.try_start(&client_capabilities).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(session = %self.id, attempt, "start attempt failed: {e}");
                    last_err = Some(e);
                    if attempt + 1 < MAX_START_ATTEMPTS {
                        let jitter_ms = fastrand::u64(0..100);
                        let delay = Duration::from_millis(200 * u64::from(attempt + 1) + jitter_ms);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::transport("start failed with no recorded error")))
    }

    async fn try_start(&self, client_capabilities: &ClientCapabilities) -> Result<InitializeResult> {
        self.transport.read().expect("poisoned").clone().start().await?;
        self.router().start();

        let params = json!({
            "protocolVersion": fluxmcp_protocol::PREFERRED_VERSION,
            "capabilities": client_capabilities,
            "clientInfo": self.config.client_info,
        });
        let value = self
            .router()
            .send_request("initialize", Some(params), self.config.request_timeout)
            .await?;

        let protocol_version = value
            .get("protocolVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_format("initialize response missing protocolVersion"))?
            .to_string();
        if !fluxmcp_protocol::is_supported(&protocol_version) {
            return Err(Error::UnsupportedProtocolVersion(protocol_version));
        }
        let server_info: Implementation = value
            .get("serverInfo")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| Error::invalid_format("initialize response missing serverInfo"))?;
        let capabilities = ServerCapabilities::from_value(
            value.get("capabilities").unwrap_or(&Value::Null),
        );
        let instructions = value
            .get("instructions")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.transport.read().expect("poisoned").set_protocol_version(&protocol_version);
        *self.protocol_version.write().expect("poisoned") = protocol_version.clone();
        *self.capabilities.write().expect("poisoned") = capabilities.clone();

        self.router()
            .send_notification("notifications/initialized", None)
            .await?;
        *self.state.write().expect("poisoned") = ConnectionState::Ready;
        info!(session = %self.id, protocol_version, "session ready");

        Ok(InitializeResult {
            protocol_version,
            server_info,
            capabilities,
            instructions,
        })
    }

    /// Graceful shutdown (spec §4.3 `stop()`): cancel every in-flight
    /// request with reason `"client shutdown"`, close the transport, and
    /// drain the router.
    pub async fn stop(&self) -> Result<()> {
        *self.state.write().expect("poisoned") = ConnectionState::Closing;
        self.router().cancel_all("client shutdown").await;
        self.transport.read().expect("poisoned").clone().stop().await?;
        self.router().shutdown();
        *self.state.write().expect("poisoned") = ConnectionState::Closed;
        Ok(())
    }

    /// `stop` then `start` against a freshly built transport and router
    /// (spec §4.3 `restart()`); the caller (Client facade) is responsible
    /// for flushing the Catalog afterward.
    pub async fn restart(&self) -> Result<InitializeResult> {
        self.stop().await.ok();

        let transport = fluxmcp_transport::build(self.config.transport.clone());
        let router = MessageRouter::new(transport.clone());
        *self.transport.write().expect("poisoned") = transport;
        *self.router.write().expect("poisoned") = router;

        if let (Some(req), Some(notif), Some(cancel)) = (
            self.request_dispatch.read().expect("poisoned").clone(),
            self.notification_dispatch.read().expect("poisoned").clone(),
            self.cancel_sink.read().expect("poisoned").clone(),
        ) {
            self.router().set_request_dispatch(req);
            self.router().set_notification_dispatch(notif);
            self.router().set_cancel_sink(cancel);
        }

        let client_capabilities = self.client_capabilities.read().expect("poisoned").clone();
        self.start(client_capabilities).await
    }

    /// `ping` (spec §4.3): true on a result, false on timeout.
    pub async fn ping(&self) -> bool {
        self.request("ping", None).await.is_ok()
    }

    /// Compare the live pid against the one recorded at connect (spec §4.3
    /// "Fork / process identity"); on mismatch, rebuild the transport and
    /// re-initialize before the caller's request proceeds.
    async fn check_fork(&self) -> Result<()> {
        let current = std::process::id();
        if self.pid.load(Ordering::SeqCst) == current {
            return Ok(());
        }
        warn!(session = %self.id, "pid changed since connect, rebuilding transport");
        self.restart().await?;
        self.pid.store(current, Ordering::SeqCst);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.check_fork().await?;
        self.router()
            .send_request(method, params, self.config.request_timeout)
            .await
    }

    /// A version of [`Self::request`] the host can cancel mid-flight (spec
    /// §8 scenario 3).
    pub async fn request_cancellable(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancelToken,
    ) -> Result<Value> {
        self.check_fork().await?;
        self.router()
            .send_request_cancellable(method, params, self.config.request_timeout, cancel)
            .await
    }

    async fn paginated<T: for<'de> serde::Deserialize<'de>>(
        &self,
        method: &str,
        field: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|c| json!({ "cursor": c }));
            let value = self.request(method, params).await?;
            let page: Page<T> = extract_page(value, field)?;
            items.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    pub async fn tool_list(&self) -> Result<Vec<Tool>> {
        self.paginated("tools/list", "tools").await
    }

    pub async fn resource_list(&self) -> Result<Vec<Resource>> {
        self.paginated("resources/list", "resources").await
    }

    pub async fn resource_template_list(&self) -> Result<Vec<ResourceTemplate>> {
        self.paginated("resources/templates/list", "resourceTemplates").await
    }

    pub async fn prompt_list(&self) -> Result<Vec<Prompt>> {
        self.paginated("prompts/list", "prompts").await
    }

    pub async fn execute_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutcome> {
        let params = json!({ "name": name, "arguments": arguments });
        let value = self.request("tools/call", Some(params)).await?;
        let content: Vec<Content> = serde_json::from_value(
            value.get("content").cloned().unwrap_or_else(|| json!([])),
        )?;
        let is_error = value.get("isError").and_then(Value::as_bool).unwrap_or(false);
        Ok(ToolCallOutcome { content, is_error })
    }

    pub async fn execute_tool_cancellable(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancelToken,
    ) -> Result<ToolCallOutcome> {
        let params = json!({ "name": name, "arguments": arguments });
        let value = self
            .request_cancellable("tools/call", Some(params), cancel)
            .await?;
        let content: Vec<Content> = serde_json::from_value(
            value.get("content").cloned().unwrap_or_else(|| json!([])),
        )?;
        let is_error = value.get("isError").and_then(Value::as_bool).unwrap_or(false);
        Ok(ToolCallOutcome { content, is_error })
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let value = self
            .request("resources/read", Some(json!({ "uri": uri })))
            .await?;
        let contents = value
            .get("contents")
            .cloned()
            .ok_or_else(|| Error::invalid_format("resources/read missing contents"))?;
        Ok(serde_json::from_value(contents)?)
    }

    pub async fn execute_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        let params = json!({ "name": name, "arguments": arguments.unwrap_or_default() });
        let value = self.request("prompts/get", Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn completion(
        &self,
        reference: Value,
        argument_name: &str,
        argument_value: &str,
    ) -> Result<CompletionResult> {
        let params = json!({
            "ref": reference,
            "argument": { "name": argument_name, "value": argument_value },
        });
        let value = self.request("completion/complete", Some(params)).await?;
        let completion = value
            .get("completion")
            .cloned()
            .ok_or_else(|| Error::invalid_format("completion/complete missing completion"))?;
        Ok(serde_json::from_value(completion)?)
    }

    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        if !self.capabilities().resources_subscribe {
            return Err(Error::capability_unavailable("resources.subscribe"));
        }
        self.request("resources/subscribe", Some(json!({ "uri": uri })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_protocol::{Frame, ResponseFrame};
    use fluxmcp_transport::duplex_pair;

    #[test]
    fn starts_in_connecting_state() {
        let coordinator = Coordinator::new(ClientConfig::default());
        assert_eq!(coordinator.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn ping_is_true_only_on_a_reply() {
        let (client_side, server_side) = duplex_pair();
        client_side.start().await.unwrap();
        server_side.start().await.unwrap();

        let coordinator = Coordinator::new_with_transport(Arc::new(client_side), ClientConfig::default());
        coordinator.router().start();

        tokio::spawn(async move {
            let frame = server_side.recv().await.unwrap().expect("ping arrives");
            let Frame::Request(req) = frame else { panic!("expected request") };
            server_side
                .send(&Frame::Response(ResponseFrame::success(req.id, json!({}))))
                .await
                .unwrap();
        });

        assert!(coordinator.ping().await);
    }

    #[tokio::test]
    async fn tool_list_follows_cursor_pages() {
        let (client_side, server_side) = duplex_pair();
        client_side.start().await.unwrap();
        server_side.start().await.unwrap();

        let coordinator = Coordinator::new_with_transport(Arc::new(client_side), ClientConfig::default());
        coordinator.router().start();

        tokio::spawn(async move {
            for (page, cursor) in [
                (json!([{"name": "a", "inputSchema": {}}]), Some("c1")),
                (json!([{"name": "b", "inputSchema": {}}]), None::<&str>),
            ] {
                let frame = server_side.recv().await.unwrap().expect("request arrives");
                let Frame::Request(req) = frame else { panic!("expected request") };
                let mut result = json!({ "tools": page });
                if let Some(c) = cursor {
                    result["nextCursor"] = json!(c);
                }
                server_side
                    .send(&Frame::Response(ResponseFrame::success(req.id, result)))
                    .await
                    .unwrap();
            }
        });

        let tools = coordinator.tool_list().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "a");
        assert_eq!(tools[1].name, "b");
    }

    #[tokio::test]
    async fn subscribe_resource_rejected_without_server_capability() {
        let (client_side, _server_side) = duplex_pair();
        client_side.start().await.unwrap();
        let coordinator = Coordinator::new_with_transport(Arc::new(client_side), ClientConfig::default());
        coordinator.router().start();

        let err = coordinator.subscribe_resource("file:///a").await.unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)));
    }
}
