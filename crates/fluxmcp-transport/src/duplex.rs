//! An in-memory duplex [`Transport`], used as the fake peer in tests — the
//! channel-backed transport the teacher's own test suites fake a peer with,
//! minus any real I/O.

use std::sync::Mutex;

use async_trait::async_trait;
use fluxmcp_protocol::{Error, Frame, Result};
use tokio::sync::mpsc;

use crate::core::Transport;

/// One half of an in-memory duplex transport pair. Frames sent on one half
/// arrive, in order, on the other half's `recv`.
#[derive(Debug)]
pub struct DuplexTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    alive: std::sync::atomic::AtomicBool,
}

/// Build a connected pair of [`DuplexTransport`]s.
#[must_use]
pub fn duplex_pair() -> (DuplexTransport, DuplexTransport) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        DuplexTransport {
            outbound: Mutex::new(Some(b_tx)),
            inbound: tokio::sync::Mutex::new(a_rx),
            alive: std::sync::atomic::AtomicBool::new(true),
        },
        DuplexTransport {
            outbound: Mutex::new(Some(a_tx)),
            inbound: tokio::sync::Mutex::new(b_rx),
            alive: std::sync::atomic::AtomicBool::new(true),
        },
    )
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn start(&self) -> Result<()> {
        self.alive.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        if !self.alive() {
            return Err(Error::transport("duplex transport closed"));
        }
        let guard = self.outbound.lock().expect("outbound mutex poisoned");
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::transport("duplex transport closed"))?;
        sender
            .send(frame.clone())
            .map_err(|_| Error::transport("peer half dropped"))
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        let mut guard = self.inbound.lock().await;
        Ok(guard.recv().await)
    }

    async fn stop(&self) -> Result<()> {
        self.alive
            .store(false, std::sync::atomic::Ordering::SeqCst);
        // Dropping our sender half lets the peer's `recv` observe closure
        // and return `Ok(None)` once its queued frames are drained.
        self.outbound.lock().expect("outbound mutex poisoned").take();
        Ok(())
    }

    fn alive(&self) -> bool {
        self.alive.load(std::sync::atomic::Ordering::SeqCst)
    }
}
