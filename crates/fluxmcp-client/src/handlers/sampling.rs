//! Sampling inbound handler (spec §4.4 "Sampling"): the server asks the host
//! to run an LLM completion. The core never talks to a model directly — it
//! only calls the host-supplied [`SamplingBackend`], per spec §6's external
//! collaborator list, grounded in the teacher's sampling capability wiring
//! (`turbomcp-client/src/client/operations/sampling.rs`).

use std::sync::Arc;

use async_trait::async_trait;
use fluxmcp_protocol::{
    CreateMessageRequest, CreateMessageResult, Error, ModelHint, RequestId, Result, ResponseFrame,
    RpcError, SamplingMessage,
};
use serde_json::Value;
use tracing::warn;

use crate::config::SamplingPolicy;

/// Chooses the model to use for a sampling completion, either a fixed
/// literal or a callback resolved from the server's hints.
#[derive(Clone)]
pub enum PreferredModel {
    Literal(String),
    Resolver(Arc<dyn Fn(&[ModelHint]) -> Result<String> + Send + Sync>),
}

/// Host collaborator that actually runs the model (spec §6 `SamplingBackend`).
#[async_trait]
pub trait SamplingBackend: Send + Sync {
    async fn create_message(
        &self,
        model: &str,
        system_prompt: Option<&str>,
        messages: &[SamplingMessage],
        max_tokens: u32,
    ) -> Result<SamplingMessage>;
}

/// The Sampling subcomponent of the Inbound Handlers dispatch table. The
/// backend lives behind a lock rather than a plain field so a host can
/// install it via [`Client::on_sampling`](crate::client::Client::on_sampling)
/// after construction, matching [`super::elicitation::ElicitationComponent`]'s
/// hot-swappable handler.
pub struct SamplingComponent {
    policy: SamplingPolicy,
    backend: std::sync::RwLock<Option<Arc<dyn SamplingBackend>>>,
}

impl SamplingComponent {
    #[must_use]
    pub fn new(policy: SamplingPolicy, backend: Option<Arc<dyn SamplingBackend>>) -> Self {
        Self {
            policy,
            backend: std::sync::RwLock::new(backend),
        }
    }

    pub fn set_backend(&self, backend: Arc<dyn SamplingBackend>) {
        *self.backend.write().expect("poisoned") = Some(backend);
    }

    /// Handle one `sampling/createMessage` request, producing its reply.
    pub async fn handle(&self, id: RequestId, params: Option<Value>) -> ResponseFrame {
        if !self.policy.enabled {
            return ResponseFrame::failure(
                id,
                RpcError::server_error(-32000, "Sampling is disabled"),
            );
        }

        let request: CreateMessageRequest = match params
            .ok_or_else(|| Error::invalid_format("sampling/createMessage missing params"))
            .and_then(|v| serde_json::from_value(v).map_err(Error::from))
        {
            Ok(req) => req,
            Err(e) => return ResponseFrame::failure(id, RpcError::server_error(-32602, e.to_string())),
        };

        if let Some(guard) = &self.policy.guard {
            if !guard(&request) {
                return ResponseFrame::failure(
                    id,
                    RpcError::server_error(-32000, "Sampling request rejected by guard"),
                );
            }
        }

        let model = match self.policy.resolve_model(&request.model_preferences.hints) {
            Ok(model) => model,
            Err(e) => return ResponseFrame::failure(id, RpcError::server_error(-32000, e.to_string())),
        };

        let Some(backend) = self.backend.read().expect("poisoned").clone() else {
            warn!("sampling enabled but no backend installed");
            return ResponseFrame::failure(
                id,
                RpcError::server_error(-32000, "No sampling backend installed"),
            );
        };

        match backend
            .create_message(
                &model,
                request.system_prompt.as_deref(),
                &request.messages,
                request.max_tokens,
            )
            .await
        {
            Ok(message) => {
                let result = CreateMessageResult {
                    role: message.role,
                    content: message.content,
                    model,
                    stop_reason: None,
                };
                ResponseFrame::success(id, serde_json::to_value(result).expect("serializable"))
            }
            Err(e) => ResponseFrame::failure(id, RpcError::server_error(e.jsonrpc_code(), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_protocol::{SamplingContent, SamplingRole};

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
            Ok(messages.last().cloned().unwrap_or(SamplingMessage {
                role: SamplingRole::Assistant,
                content: SamplingContent::Text { text: String::new() },
            }))
        }
    }

    #[tokio::test]
    async fn disabled_sampling_returns_dash_32000() {
        let component = SamplingComponent::new(SamplingPolicy::default(), None);
        let response = component.handle(RequestId::Number(1), None).await;
        assert_eq!(response.error().unwrap().code, -32000);
    }

    #[tokio::test]
    async fn guard_rejection_short_circuits_backend() {
        let policy = SamplingPolicy {
            enabled: true,
            guard: Some(Arc::new(|_: &CreateMessageRequest| false)),
            preferred_model: None,
        };
        let component = SamplingComponent::new(policy, Some(Arc::new(Echo)));
        let params = serde_json::json!({
            "messages": [{"role":"user","content":{"type":"text","text":"hi"}}],
            "maxTokens": 10,
        });
        let response = component.handle(RequestId::Number(1), Some(params)).await;
        assert_eq!(response.error().unwrap().code, -32000);
    }

    #[tokio::test]
    async fn enabled_sampling_invokes_backend_and_echoes_model() {
        let policy = SamplingPolicy {
            enabled: true,
            guard: None,
            preferred_model: Some(PreferredModel::Literal("test-model".to_string())),
        };
        let component = SamplingComponent::new(policy, Some(Arc::new(Echo)));
        let params = serde_json::json!({
            "messages": [{"role":"user","content":{"type":"text","text":"hi"}}],
            "maxTokens": 10,
        });
        let response = component.handle(RequestId::Number(1), Some(params)).await;
        assert!(response.error().is_none());
        let result = response.result().unwrap();
        assert_eq!(result["model"], "test-model");
    }
}
