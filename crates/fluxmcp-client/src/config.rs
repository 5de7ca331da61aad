//! Host-facing client configuration (spec §6's transport config surface plus
//! sampling/roots policy), modeled as plain immutable data passed into
//! [`crate::Client::new`] rather than a process-wide singleton — the
//! redesign called for in spec §9 ("Process-wide configuration singleton").
//! Builder style follows the teacher's `HttpSseClientConfig`
//! (`turbomcp-transport/src/http_sse_client.rs`).

use std::sync::Arc;
use std::time::Duration;

use fluxmcp_protocol::{Implementation, LogLevel, ModelHint, Root};
pub use fluxmcp_transport::AuthProvider;
use fluxmcp_transport::TransportConfig;

use crate::handlers::sampling::PreferredModel;

/// Sampling policy: whether the server may ask the host to run an LLM
/// completion, and how the host gates/guides it.
#[derive(Clone, Default)]
pub struct SamplingPolicy {
    pub enabled: bool,
    /// Called with the parsed request before invoking the backend; a
    /// `false` return rejects the request with `-32000`.
    pub guard: Option<Arc<dyn Fn(&fluxmcp_protocol::CreateMessageRequest) -> bool + Send + Sync>>,
    pub preferred_model: Option<PreferredModel>,
}

impl std::fmt::Debug for SamplingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingPolicy")
            .field("enabled", &self.enabled)
            .field("guard", &self.guard.is_some())
            .field("preferred_model", &self.preferred_model.is_some())
            .finish()
    }
}

/// Configuration bound to a [`crate::Client`] at construction time.
#[derive(Clone)]
pub struct ClientConfig {
    /// Identifies this client to the server during `initialize`.
    pub client_info: Implementation,
    /// Which transport to build and how to configure it.
    pub transport: TransportConfig,
    /// Per-request deadline; spec default is 8 seconds.
    pub request_timeout: Duration,
    /// Local roots advertised to the server via `roots/list`.
    pub roots: Vec<Root>,
    /// Sampling policy (enabled/guard/preferred model).
    pub sampling: SamplingPolicy,
    /// Minimum severity gating `notifications/message` delivery to the
    /// logging hook.
    pub logging_level: LogLevel,
    /// How long a deferred elicitation may remain unanswered before the
    /// client auto-cancels it.
    pub elicitation_timeout: Duration,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_info", &self.client_info)
            .field("transport", &self.transport)
            .field("request_timeout", &self.request_timeout)
            .field("roots", &self.roots)
            .field("sampling", &self.sampling)
            .field("logging_level", &self.logging_level)
            .field("elicitation_timeout", &self.elicitation_timeout)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "fluxmcp-client".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
            },
            transport: TransportConfig::Stdio(fluxmcp_transport::StdioConfig::default()),
            request_timeout: Duration::from_secs(8),
            roots: Vec::new(),
            sampling: SamplingPolicy::default(),
            logging_level: LogLevel::Info,
            elicitation_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = roots;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    #[must_use]
    pub fn with_logging_level(mut self, level: LogLevel) -> Self {
        self.logging_level = level;
        self
    }

    /// Install an [`AuthProvider`] on the configured HTTP transport (SSE or
    /// streamable HTTP). A no-op on the stdio transport, which has no
    /// headers to authorize (spec §6 `oauth`: "HTTP variants... opaque
    /// AuthProvider reference").
    #[must_use]
    pub fn with_auth_provider(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        match &mut self.transport {
            TransportConfig::Sse(http) | TransportConfig::StreamableHttp(http) => {
                http.auth = Some(auth);
            }
            TransportConfig::Stdio(_) => {
                tracing::warn!("with_auth_provider has no effect on the stdio transport");
            }
        }
        self
    }
}

/// A resolved or resolvable preference for which model to use for a
/// sampling completion.
impl SamplingPolicy {
    #[must_use]
    pub fn resolve_model(&self, hints: &[ModelHint]) -> fluxmcp_protocol::Result<String> {
        match &self.preferred_model {
            None => hints
                .first()
                .map(|h| h.name.clone())
                .ok_or_else(|| fluxmcp_protocol::Error::configuration("no model preference available")),
            Some(PreferredModel::Literal(name)) => Ok(name.clone()),
            Some(PreferredModel::Resolver(resolve)) => resolve(hints),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_eight_second_timeout() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(8));
    }

    #[test]
    fn resolve_model_falls_back_to_first_hint() {
        let policy = SamplingPolicy::default();
        let hints = vec![ModelHint { name: "claude".to_string() }];
        assert_eq!(policy.resolve_model(&hints).unwrap(), "claude");
    }

    #[test]
    fn resolve_model_prefers_literal_override() {
        let policy = SamplingPolicy {
            preferred_model: Some(PreferredModel::Literal("gpt-5".to_string())),
            ..SamplingPolicy::default()
        };
        assert_eq!(policy.resolve_model(&[]).unwrap(), "gpt-5");
    }
}
