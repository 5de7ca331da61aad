//! Transport configuration surface (spec §6's transport config table),
//! modeled as plain data with `Default` + `with_*` builder methods, the
//! teacher's `HttpSseClientConfig` / `ChildProcessConfig` style
//! (`turbomcp-transport/src/http_sse_client.rs`, `child_process.rs`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthProvider;

/// Bounded exponential backoff parameters for SSE/streamable-HTTP
/// reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Ceiling the backoff delay never exceeds.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Maximum number of attempts; `0` means unbounded.
    pub max_attempts: u32,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectionConfig {
    /// The delay to wait before reconnect attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Whether another attempt is permitted after `attempts_so_far` failures.
    #[must_use]
    pub const fn allows_attempt(&self, attempts_so_far: u32) -> bool {
        self.max_attempts == 0 || attempts_so_far < self.max_attempts
    }
}

/// Configuration for the stdio (child-process) transport.
#[derive(Debug, Clone, Default)]
pub struct StdioConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Extra environment variables for the child (merged over inherited env).
    pub env: HashMap<String, String>,
    /// Working directory for the child process.
    pub working_directory: Option<String>,
}

/// Configuration shared by the HTTP-based transports (SSE, streamable HTTP).
#[derive(Clone)]
pub struct HttpConfig {
    /// Base URL of the MCP server endpoint.
    pub url: String,
    /// Extra request headers sent on every request.
    pub headers: HashMap<String, String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Reconnection policy for the SSE stream / streamable-HTTP GET.
    pub reconnection: ReconnectionConfig,
    /// A previously issued `Mcp-Session-Id` to resume, if any.
    pub session_id: Option<String>,
    /// Mints authorization headers and refreshes credentials on a `401`
    /// (spec §6 `AuthProvider`). OAuth 2.1 itself is out of scope; this is
    /// only the seam.
    pub auth: Option<Arc<dyn AuthProvider>>,
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("request_timeout", &self.request_timeout)
            .field("reconnection", &self.reconnection)
            .field("session_id", &self.session_id)
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            request_timeout: Duration::from_secs(8),
            reconnection: ReconnectionConfig::default(),
            session_id: None,
            auth: None,
        }
    }
}

/// The transport variant to construct, carrying its own configuration.
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// Spawn a child process and speak line-delimited JSON over its pipes.
    Stdio(StdioConfig),
    /// HTTP GET with `text/event-stream`, POST for outbound requests.
    Sse(HttpConfig),
    /// Single URL, POST for requests, GET for streamed replies.
    StreamableHttp(HttpConfig),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = ReconnectionConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 0,
        };
        assert_eq!(cfg.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(cfg.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn unbounded_attempts_always_allowed() {
        let cfg = ReconnectionConfig {
            max_attempts: 0,
            ..ReconnectionConfig::default()
        };
        assert!(cfg.allows_attempt(1_000_000));
    }

    #[test]
    fn bounded_attempts_stop() {
        let cfg = ReconnectionConfig {
            max_attempts: 3,
            ..ReconnectionConfig::default()
        };
        assert!(cfg.allows_attempt(2));
        assert!(!cfg.allows_attempt(3));
    }
}
