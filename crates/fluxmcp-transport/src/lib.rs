//! Wire-level transports for the FluxMCP client: stdio, SSE, and streamable
//! HTTP, all speaking the [`Transport`] trait defined here. See
//! [`fluxmcp_protocol`] for the frames carried over them.

mod auth;
mod config;
mod core;
mod duplex;
mod sse;
mod stdio;
mod streamable_http;

pub use auth::AuthProvider;
pub use config::{HttpConfig, ReconnectionConfig, StdioConfig, TransportConfig};
pub use core::Transport;
pub use duplex::{DuplexTransport, duplex_pair};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable_http::StreamableHttpTransport;

use std::sync::Arc;

/// Build the concrete transport named by `config`, grounded in the teacher's
/// `TransportFactory` pattern (`turbomcp-transport/src/core.rs`) of picking a
/// transport implementation from a configuration enum.
#[must_use]
pub fn build(config: TransportConfig) -> Arc<dyn Transport> {
    match config {
        TransportConfig::Stdio(cfg) => Arc::new(StdioTransport::new(cfg)),
        TransportConfig::Sse(cfg) => Arc::new(SseTransport::new(cfg)),
        TransportConfig::StreamableHttp(cfg) => Arc::new(StreamableHttpTransport::new(cfg)),
    }
}
