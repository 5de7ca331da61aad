//! The [`Transport`] trait: a reliable, ordered, duplex stream of JSON-RPC
//! frames, per spec §4.1.
//!
//! Transports are pull-based on the receive side (mirroring the teacher's
//! `Transport::receive()` pattern used by its message dispatcher) so a single
//! background task can be the sole consumer without any extra stream
//! adapters. `send` enqueues a frame for delivery; it may block briefly on a
//! local write but must never block waiting for a response.

use async_trait::async_trait;
use fluxmcp_protocol::{Frame, Result};

/// A duplex channel of JSON-RPC frames to a single MCP peer.
///
/// Implementations: [`crate::stdio::StdioTransport`] (child-process pipes),
/// [`crate::sse::SseTransport`] (HTTP+SSE), and
/// [`crate::streamable_http::StreamableHttpTransport`] (streamable HTTP).
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Establish the connection and perform any transport-level handshake
    /// (SSE's `endpoint` discovery, streamable HTTP's session negotiation).
    async fn start(&self) -> Result<()>;

    /// Enqueue a frame for delivery to the peer.
    async fn send(&self, frame: &Frame) -> Result<()>;

    /// Pull the next frame from the peer, or `Ok(None)` once the transport
    /// has been closed with no further frames pending. For any two frames
    /// the peer wrote in the same order, this returns them in that order.
    async fn recv(&self) -> Result<Option<Frame>>;

    /// Close the connection. Any in-flight `recv` call returns `Ok(None)`.
    async fn stop(&self) -> Result<()>;

    /// Whether the transport believes it is currently connected.
    fn alive(&self) -> bool;

    /// The protocol version this transport should echo on the wire (HTTP
    /// variants set `Mcp-Protocol-Version`; stdio ignores this). Set once
    /// negotiation completes.
    fn set_protocol_version(&self, _version: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::duplex_pair;

    #[tokio::test]
    async fn duplex_pair_round_trips_a_frame() {
        let (a, b) = duplex_pair();
        a.start().await.unwrap();
        b.start().await.unwrap();

        let frame = Frame::parse(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        a.send(&frame).await.unwrap();

        let received = b.recv().await.unwrap().expect("frame delivered");
        assert!(matches!(received, Frame::Request(r) if r.method == "ping"));
    }

    #[tokio::test]
    async fn stop_unblocks_recv_with_none() {
        let (a, b) = duplex_pair();
        a.start().await.unwrap();
        b.start().await.unwrap();
        a.stop().await.unwrap();
        assert!(!a.alive());
        assert!(b.recv().await.unwrap().is_none());
    }
}
