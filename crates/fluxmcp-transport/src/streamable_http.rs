//! Streamable HTTP transport (spec §4.1 "Streamable HTTP"): a single URL,
//! POSTed requests/notifications, and a long-lived GET carrying server-to-
//! client messages. Session continuity is tracked via the `Mcp-Session-Id`
//! header; a `404` on either verb means the server has expired the session
//! and the coordinator must re-initialize, grounded in the teacher's
//! session-id propagation in `http_sse_client.rs` and its `ConnectionState`
//! handling in `client/manager.rs`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fluxmcp_protocol::{Error, Frame, Result};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::core::Transport;

/// Transport speaking the streamable-HTTP variant of MCP: one URL, POST for
/// outbound, GET for the inbound stream.
#[derive(Debug)]
pub struct StreamableHttpTransport {
    config: HttpConfig,
    http: HttpClient,
    session_id: Arc<Mutex<Option<String>>>,
    protocol_version: Arc<Mutex<Option<String>>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    alive: AtomicBool,
}

impl StreamableHttpTransport {
    /// Build a transport for the given streamable-HTTP endpoint.
    #[must_use]
    pub fn new(config: HttpConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build reqwest client");
        let session_id = Arc::new(Mutex::new(config.session_id.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            http,
            session_id,
            protocol_version: Arc::new(Mutex::new(None)),
            inbound_rx: Mutex::new(rx),
            inbound_tx: tx,
            task: Mutex::new(None),
            alive: AtomicBool::new(false),
        }
    }

    /// The `Mcp-Session-Id` currently in use, if the server has assigned one.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    async fn apply_common_headers(
        &self,
        mut req: reqwest::RequestBuilder,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if let Some(auth) = &self.config.auth {
            for (key, value) in auth.authorize(body).await {
                req = req.header(key, value);
            }
        }
        if let Some(id) = self.session_id.lock().await.clone() {
            req = req.header("Mcp-Session-Id", id);
        }
        if let Some(version) = self.protocol_version.lock().await.clone() {
            req = req.header("Mcp-Protocol-Version", version);
        }
        req
    }

    async fn post_once(&self, body: &Value) -> Result<reqwest::Response> {
        let req = self.http.post(&self.config.url).json(body);
        let req = self.apply_common_headers(req, body).await;
        req.send()
            .await
            .map_err(|e| Error::transport(format!("streamable http POST failed: {e}")))
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn start(&self) -> Result<()> {
        if self.config.url.is_empty() {
            return Err(Error::configuration("streamable http transport requires a url"));
        }

        let http = self.http.clone();
        let url = self.config.url.clone();
        let headers = self.config.headers.clone();
        let reconnection = self.config.reconnection.clone();
        let session_id = self.session_id.clone();
        let protocol_version = self.protocol_version.clone();
        let tx = self.inbound_tx.clone();

        self.alive.store(true, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            listen_loop(http, url, headers, reconnection, session_id, protocol_version, tx).await;
        });
        *self.task.lock().await = Some(task);
        Ok(())
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        let body = match frame {
            Frame::Request(r) => serde_json::to_value(r),
            Frame::Response(r) => serde_json::to_value(r),
            Frame::Notification(n) => serde_json::to_value(n),
        }
        .map_err(Error::from)?;

        let mut response = self.post_once(&body).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let refreshed = match &self.config.auth {
                Some(auth) => auth.refresh().await,
                None => false,
            };
            if !refreshed {
                return Err(Error::transport("streamable http POST returned status 401"));
            }
            response = self.post_once(&body).await?;
        }

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SessionExpired);
        }
        if let Some(id) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(id.to_string());
        }
        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "streamable http POST returned status {}",
                response.status()
            )));
        }

        // A JSON body in the POST response is itself an inbound frame (the
        // synchronous reply to this request); stream replies arrive on the
        // background GET and are merged into the same inbound queue.
        if let Ok(bytes) = response.bytes().await {
            if !bytes.is_empty() {
                if let Ok(frame) = Frame::parse(&bytes) {
                    let _ = self.inbound_tx.send(frame);
                }
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        let mut guard = self.inbound_rx.lock().await;
        Ok(guard.recv().await)
    }

    async fn stop(&self) -> Result<()> {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn set_protocol_version(&self, version: &str) {
        let version = version.to_string();
        let cell = self.protocol_version.clone();
        tokio::spawn(async move {
            *cell.lock().await = Some(version);
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn listen_loop(
    http: HttpClient,
    url: String,
    headers: std::collections::HashMap<String, String>,
    reconnection: crate::config::ReconnectionConfig,
    session_id: Arc<Mutex<Option<String>>>,
    protocol_version: Arc<Mutex<Option<String>>>,
    tx: mpsc::UnboundedSender<Frame>,
) {
    let mut attempt = 0u32;
    loop {
        if !reconnection.allows_attempt(attempt) {
            warn!("streamable http GET reconnection attempts exhausted, giving up");
            return;
        }

        let mut req = http.get(&url).header(reqwest::header::ACCEPT, "text/event-stream");
        for (key, value) in &headers {
            req = req.header(key, value);
        }
        if let Some(id) = session_id.lock().await.clone() {
            req = req.header("Mcp-Session-Id", id);
        }
        if let Some(version) = protocol_version.lock().await.clone() {
            req = req.header("Mcp-Protocol-Version", version);
        }

        match req.send().await {
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                warn!("streamable http session expired on GET, stopping listen loop");
                return;
            }
            Ok(response) if response.status().is_success() => {
                attempt = 0;
                if let Some(id) = response
                    .headers()
                    .get("mcp-session-id")
                    .and_then(|v| v.to_str().ok())
                {
                    *session_id.lock().await = Some(id.to_string());
                }
                if drain_stream(response, &tx).await.is_err() {
                    return;
                }
            }
            Ok(response) => {
                warn!("streamable http GET failed with status {}", response.status());
            }
            Err(e) => {
                warn!("streamable http GET error: {e}");
            }
        }

        if tx.is_closed() {
            return;
        }
        let delay = reconnection.delay_for_attempt(attempt);
        attempt += 1;
        tokio::time::sleep(delay).await;
    }
}

async fn drain_stream(
    response: reqwest::Response,
    tx: &mpsc::UnboundedSender<Frame>,
) -> std::result::Result<(), ()> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!("streamable http stream error: {e}");
                break;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            let payload = line.strip_prefix("data:").map_or(line.as_str(), str::trim);
            match Frame::parse(payload.as_bytes()) {
                Ok(frame) => {
                    if tx.send(frame).is_err() {
                        return Err(());
                    }
                }
                Err(e) => warn!("dropping unparseable streamable-http frame: {e}"),
            }
        }
    }
    debug!("streamable http GET stream closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_requires_a_url() {
        let transport = StreamableHttpTransport::new(HttpConfig::default());
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn carries_a_pre_seeded_session_id() {
        let transport = StreamableHttpTransport::new(HttpConfig {
            session_id: Some("abc123".to_string()),
            ..HttpConfig::default()
        });
        assert_eq!(transport.session_id().await.as_deref(), Some("abc123"));
    }
}
