//! Elicitation inbound handler (spec §4.4 "Elicitation") and its deferred
//! registry. The server asks the host for structured data matching a JSON
//! schema; the host handler may answer immediately or return `pending` and
//! complete later via [`ElicitationComponent::complete`] /
//! [`ElicitationComponent::cancel`].
//!
//! Cancellation-while-running (spec §9 Open Question #3): every dispatch
//! captures a generation number at insert time. A cancellation bumps the
//! registry entry's generation without necessarily removing it (if the
//! handler is still executing, its eventual result must be discardable).
//! When the handler resolves, it re-checks its captured generation against
//! the registry's current one; a mismatch means it was cancelled out from
//! under it, and its result is discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fluxmcp_protocol::{ElicitRequest, ElicitResult, Error, RequestId, ResponseFrame, RpcError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::router::{InboundCancelSink, MessageRouter};

/// Pure validation seam (spec §6 `SchemaValidator`); JSON-schema validation
/// itself is out of scope for the core.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &Value, value: &Value) -> bool;
}

/// Permissive default used when the host installs no validator: every
/// response is accepted as-is. Hosts that need real validation supply their
/// own `SchemaValidator`.
pub struct AlwaysValid;

impl SchemaValidator for AlwaysValid {
    fn validate(&self, _schema: &Value, _value: &Value) -> bool {
        true
    }
}

/// What the host's elicitation handler decided.
pub enum ElicitationOutcome {
    Accept(Value),
    Decline,
    Cancel,
    /// Defer the decision; the host will call `complete`/`cancel` later.
    Pending,
}

/// Host collaborator consulted on `elicitation/create` (spec §6
/// `ElicitationHandler`).
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    async fn handle(&self, request: &ElicitRequest) -> ElicitationOutcome;
}

struct DeferredEntry {
    schema: Value,
    generation: u64,
    truly_pending: bool,
}

/// The Elicitation subcomponent: dispatches `elicitation/create` and owns
/// the deferred-completion registry.
pub struct ElicitationComponent {
    handler: std::sync::RwLock<Option<Arc<dyn ElicitationHandler>>>,
    validator: std::sync::RwLock<Arc<dyn SchemaValidator>>,
    registry: std::sync::Mutex<HashMap<RequestId, DeferredEntry>>,
    router: std::sync::RwLock<Option<Arc<MessageRouter>>>,
    timeout: Duration,
}

impl ElicitationComponent {
    #[must_use]
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            handler: std::sync::RwLock::new(None),
            validator: std::sync::RwLock::new(Arc::new(AlwaysValid)),
            registry: std::sync::Mutex::new(HashMap::new()),
            router: std::sync::RwLock::new(None),
            timeout,
        })
    }

    pub fn set_handler(&self, handler: Arc<dyn ElicitationHandler>) {
        *self.handler.write().expect("poisoned") = Some(handler);
    }

    pub fn set_validator(&self, validator: Arc<dyn SchemaValidator>) {
        *self.validator.write().expect("poisoned") = validator;
    }

    /// Wire in the router so deferred completions can send a response after
    /// `handle` has already returned `None`.
    pub fn attach_router(&self, router: Arc<MessageRouter>) {
        *self.router.write().expect("poisoned") = Some(router);
    }

    /// Dispatch one `elicitation/create` request. Returns the immediate
    /// reply, or `None` if the handler deferred (the reply will arrive later
    /// via `complete`/`cancel`/timeout).
    pub async fn handle(
        self: &Arc<Self>,
        id: RequestId,
        params: Option<Value>,
    ) -> Option<ResponseFrame> {
        let Some(handler) = self.handler.read().expect("poisoned").clone() else {
            return Some(ResponseFrame::failure(
                id,
                RpcError::server_error(-32000, "Elicitation is disabled"),
            ));
        };

        let request: ElicitRequest = match params
            .ok_or_else(|| Error::invalid_format("elicitation/create missing params"))
            .and_then(|v| serde_json::from_value(v).map_err(Error::from))
        {
            Ok(req) => req,
            Err(e) => {
                return Some(ResponseFrame::failure(
                    id,
                    RpcError::server_error(-32602, e.to_string()),
                ));
            }
        };

        let my_generation = 0u64;
        {
            let mut registry = self.registry.lock().expect("poisoned");
            registry.insert(
                id.clone(),
                DeferredEntry {
                    schema: request.requested_schema.clone(),
                    generation: my_generation,
                    truly_pending: false,
                },
            );
        }

        let outcome = handler.handle(&request).await;

        let claimed = {
            let mut registry = self.registry.lock().expect("poisoned");
            match registry.remove(&id) {
                Some(entry) => entry.generation == my_generation,
                None => false,
            }
        };
        if !claimed {
            debug!("elicitation {id} was cancelled while its handler was running; discarding result");
            return None;
        }

        match outcome {
            ElicitationOutcome::Pending => {
                self.registry.lock().expect("poisoned").insert(
                    id.clone(),
                    DeferredEntry {
                        schema: request.requested_schema,
                        generation: my_generation,
                        truly_pending: true,
                    },
                );
                let component = Arc::clone(self);
                let watch_id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(component.timeout).await;
                    component.timeout_elapsed(watch_id, my_generation).await;
                });
                None
            }
            ElicitationOutcome::Accept(data) => {
                let result = if self
                    .validator
                    .read()
                    .expect("poisoned")
                    .validate(&request.requested_schema, &data)
                {
                    ElicitResult::Accept { content: data }
                } else {
                    ElicitResult::Cancel
                };
                Some(ResponseFrame::success(id, serde_json::to_value(result).expect("serializable")))
            }
            ElicitationOutcome::Decline => Some(ResponseFrame::success(
                id,
                serde_json::to_value(ElicitResult::Decline).expect("serializable"),
            )),
            ElicitationOutcome::Cancel => Some(ResponseFrame::success(
                id,
                serde_json::to_value(ElicitResult::Cancel).expect("serializable"),
            )),
        }
    }

    /// External completion of a deferred elicitation: validate `data`
    /// against its schema and send `accept` or `cancel` accordingly.
    pub async fn complete(&self, id: RequestId, data: Value) -> fluxmcp_protocol::Result<()> {
        let schema = {
            let mut registry = self.registry.lock().expect("poisoned");
            match registry.remove(&id) {
                Some(entry) => entry.schema,
                None => {
                    return Err(Error::configuration(format!(
                        "no deferred elicitation pending for request {id}"
                    )));
                }
            }
        };
        let result = if self.validator.read().expect("poisoned").validate(&schema, &data) {
            ElicitResult::Accept { content: data }
        } else {
            ElicitResult::Cancel
        };
        self.reply(id, result).await;
        Ok(())
    }

    async fn timeout_elapsed(&self, id: RequestId, generation: u64) {
        let should_cancel = {
            let mut registry = self.registry.lock().expect("poisoned");
            match registry.get(&id) {
                Some(entry) if entry.truly_pending && entry.generation == generation => {
                    registry.remove(&id);
                    true
                }
                _ => false,
            }
        };
        if should_cancel {
            debug!("elicitation {id} auto-cancelled after timeout");
            self.reply(id, ElicitResult::Cancel).await;
        }
    }

    async fn reply(&self, id: RequestId, result: ElicitResult) {
        let response = ResponseFrame::success(id, serde_json::to_value(result).expect("serializable"));
        let router = self.router.read().expect("poisoned").clone();
        if let Some(router) = router {
            if let Err(e) = router.send_response(response).await {
                warn!("failed to send deferred elicitation response: {e}");
            }
        } else {
            warn!("elicitation component has no router attached; dropping response");
        }
    }
}

#[async_trait]
impl InboundCancelSink for ElicitationComponent {
    async fn cancel(&self, id: RequestId, _reason: Option<String>) {
        let action = {
            let mut registry = self.registry.lock().expect("poisoned");
            match registry.get_mut(&id) {
                Some(entry) if entry.truly_pending => {
                    registry.remove(&id);
                    Some(())
                }
                Some(entry) => {
                    entry.generation += 1;
                    Some(())
                }
                None => None,
            }
        };
        match action {
            Some(()) => self.reply(id, ElicitResult::Cancel).await,
            None => debug!("cancel for unknown/already-resolved elicitation {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_transport::duplex_pair;

    struct Immediate(Value);

    #[async_trait]
    impl ElicitationHandler for Immediate {
        async fn handle(&self, _request: &ElicitRequest) -> ElicitationOutcome {
            ElicitationOutcome::Accept(self.0.clone())
        }
    }

    struct Defer;

    #[async_trait]
    impl ElicitationHandler for Defer {
        async fn handle(&self, _request: &ElicitRequest) -> ElicitationOutcome {
            ElicitationOutcome::Pending
        }
    }

    fn sample_request() -> ElicitRequest {
        ElicitRequest {
            message: "confirm?".to_string(),
            requested_schema: serde_json::json!({
                "type": "object",
                "required": ["confirmed"],
                "properties": { "confirmed": { "type": "boolean" } },
            }),
        }
    }

    #[tokio::test]
    async fn immediate_accept_produces_a_response_and_empty_registry() {
        let component = ElicitationComponent::new(Duration::from_secs(1));
        component.set_handler(Arc::new(Immediate(serde_json::json!({"confirmed": true}))));
        let params = Some(serde_json::json!({
            "message": "confirm?",
            "requestedSchema": sample_request().requested_schema,
        }));
        let response = component.handle(RequestId::Number(1), params).await;
        assert!(response.is_some());
        assert!(component.registry.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deferred_completion_sends_exactly_one_response() {
        let (client_side, server_side) = duplex_pair();
        client_side.start().await.unwrap();
        server_side.start().await.unwrap();

        let router = MessageRouter::new(Arc::new(client_side));
        let component = ElicitationComponent::new(Duration::from_secs(5));
        component.attach_router(Arc::clone(&router));
        component.set_handler(Arc::new(Defer));

        let params = Some(serde_json::json!({
            "message": "confirm?",
            "requestedSchema": sample_request().requested_schema,
        }));
        let id = RequestId::String("defer-1".to_string());
        let reply = component.handle(id.clone(), params).await;
        assert!(reply.is_none(), "deferred requests answer later, not immediately");
        assert!(!component.registry.lock().unwrap().is_empty());

        component
            .complete(id, serde_json::json!({"confirmed": true}))
            .await
            .unwrap();

        assert!(component.registry.lock().unwrap().is_empty());
        let frame = server_side.recv().await.unwrap().expect("response delivered");
        let fluxmcp_protocol::Frame::Response(resp) = frame else { panic!("expected response") };
        assert!(resp.error().is_none());
    }
}
