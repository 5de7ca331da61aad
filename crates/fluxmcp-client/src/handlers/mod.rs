//! Inbound Handlers (spec §4.4): the static dispatch table over
//! `ping`/`roots/list`/`sampling/createMessage`/`elicitation/create`, the
//! "static dispatch table (method → handler function)" called for by spec §9
//! in place of the teacher's dynamic per-method handler registry
//! (`turbomcp-client/src/client/dispatcher.rs`).

pub mod elicitation;
pub mod roots;
pub mod sampling;

use std::sync::Arc;

use async_trait::async_trait;
use fluxmcp_protocol::{RequestId, ResponseFrame, RpcError};
use serde_json::Value;

use crate::router::{InboundCancelSink, RequestDispatch};
use elicitation::ElicitationComponent;
use roots::RootsComponent;
use sampling::SamplingComponent;

/// The dispatch table itself: routes an inbound request's `method` to the
/// matching subcomponent, per spec §4.4's tagged dispatch.
pub struct InboundDispatcher {
    pub roots: Arc<RootsComponent>,
    pub sampling: Arc<SamplingComponent>,
    pub elicitation: Arc<ElicitationComponent>,
}

#[async_trait]
impl RequestDispatch for InboundDispatcher {
    async fn handle_request(
        &self,
        id: RequestId,
        method: String,
        params: Option<Value>,
    ) -> Option<ResponseFrame> {
        match method.as_str() {
            "ping" => Some(ResponseFrame::success(id, serde_json::json!({}))),
            "roots/list" => Some(self.roots.handle(id)),
            "sampling/createMessage" => Some(self.sampling.handle(id, params).await),
            "elicitation/create" => self.elicitation.handle(id, params).await,
            other => Some(ResponseFrame::failure(id, RpcError::method_not_found(other))),
        }
    }
}

/// Deferred inbound requests (currently only elicitation) also need to honor
/// server-initiated `notifications/cancelled`; this forwards to the
/// elicitation component, the only subcomponent with a deferred registry.
#[async_trait]
impl InboundCancelSink for InboundDispatcher {
    async fn cancel(&self, id: RequestId, reason: Option<String>) {
        self.elicitation.cancel(id, reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dispatcher() -> InboundDispatcher {
        InboundDispatcher {
            roots: Arc::new(RootsComponent::new(Vec::new())),
            sampling: Arc::new(SamplingComponent::new(
                crate::config::SamplingPolicy::default(),
                None,
            )),
            elicitation: ElicitationComponent::new(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn ping_is_answered_inline() {
        let dispatch = dispatcher();
        let response = dispatch
            .handle_request(RequestId::Number(1), "ping".to_string(), None)
            .await
            .unwrap();
        assert!(response.error().is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatch = dispatcher();
        let response = dispatch
            .handle_request(RequestId::Number(1), "frobnicate".to_string(), None)
            .await
            .unwrap();
        assert_eq!(response.error().unwrap().code, -32601);
    }
}
