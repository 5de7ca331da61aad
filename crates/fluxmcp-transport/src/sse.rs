//! HTTP + Server-Sent-Events transport (spec §4.1 "SSE"), grounded in the
//! teacher's `HttpSseClientTransport`
//! (`turbomcp-transport/src/http_sse_client.rs`): GET the SSE stream with
//! `Accept: text/event-stream`, discover the POST endpoint from the initial
//! `endpoint` event, and reconnect with `Last-Event-ID` on disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fluxmcp_protocol::{Error, Frame, Result};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::HttpConfig;
use crate::core::Transport;

/// HTTP+SSE transport: GET for the event stream, POST for outbound requests.
#[derive(Debug)]
pub struct SseTransport {
    config: HttpConfig,
    http: HttpClient,
    post_endpoint: Arc<Mutex<Option<String>>>,
    endpoint_ready: Arc<Notify>,
    last_event_id: Arc<Mutex<Option<String>>>,
    protocol_version: Arc<Mutex<Option<String>>>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    alive: AtomicBool,
}

impl SseTransport {
    async fn post_once(&self, endpoint: &str, body: &Value) -> Result<reqwest::Response> {
        let mut req = self.http.post(endpoint).json(body);
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if let Some(auth) = &self.config.auth {
            for (key, value) in auth.authorize(body).await {
                req = req.header(key, value);
            }
        }
        if let Some(version) = self.protocol_version.lock().await.clone() {
            req = req.header("Mcp-Protocol-Version", version);
        }
        req.send()
            .await
            .map_err(|e| Error::transport(format!("SSE POST failed: {e}")))
    }

    fn check_status(response: reqwest::Response) -> Result<()> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SessionExpired);
        }
        if !response.status().is_success() {
            return Err(Error::transport(format!(
                "SSE POST returned status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Build a transport for the given SSE endpoint configuration.
    #[must_use]
    pub fn new(config: HttpConfig) -> Self {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build reqwest client");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            http,
            post_endpoint: Arc::new(Mutex::new(None)),
            endpoint_ready: Arc::new(Notify::new()),
            last_event_id: Arc::new(Mutex::new(None)),
            protocol_version: Arc::new(Mutex::new(None)),
            inbound_rx: Mutex::new(rx),
            inbound_tx: tx,
            task: Mutex::new(None),
            alive: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self) -> Result<()> {
        if self.config.url.is_empty() {
            return Err(Error::configuration("sse transport requires a url"));
        }

        let http = self.http.clone();
        let url = self.config.url.clone();
        let headers = self.config.headers.clone();
        let reconnection = self.config.reconnection.clone();
        let post_endpoint = self.post_endpoint.clone();
        let endpoint_ready = self.endpoint_ready.clone();
        let last_event_id = self.last_event_id.clone();
        let tx = self.inbound_tx.clone();

        self.alive.store(true, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            sse_loop(http, url, headers, reconnection, post_endpoint, endpoint_ready, last_event_id, tx)
                .await;
        });
        *self.task.lock().await = Some(task);

        // Block until the server's `endpoint` event names the POST URL, or
        // give up once the reconnection policy is exhausted.
        tokio::select! {
            () = self.endpoint_ready.notified() => Ok(()),
            () = tokio::time::sleep(std::time::Duration::from_secs(30)) => {
                Err(Error::transport("timed out waiting for SSE endpoint event"))
            }
        }
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        let endpoint = self
            .post_endpoint
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::transport("no POST endpoint discovered yet"))?;

        let body = match frame {
            Frame::Request(r) => serde_json::to_value(r),
            Frame::Response(r) => serde_json::to_value(r),
            Frame::Notification(n) => serde_json::to_value(n),
        }
        .map_err(Error::from)?;

        let response = self.post_once(&endpoint, &body).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(auth) = &self.config.auth {
                if auth.refresh().await {
                    let retried = self.post_once(&endpoint, &body).await?;
                    return Self::check_status(retried);
                }
            }
            return Err(Error::transport("SSE POST returned status 401"));
        }
        Self::check_status(response)
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
async fn sse_loop(
    http: HttpClient,
    url: String,
    headers: std::collections::HashMap<String, String>,
    reconnection: crate::config::ReconnectionConfig,
    post_endpoint: Arc<Mutex<Option<String>>>,
    endpoint_ready: Arc<Notify>,
    last_event_id: Arc<Mutex<Option<String>>>,
    tx: mpsc::UnboundedSender<Frame>,
) {
    let mut attempt = 0u32;
    loop {
        if !reconnection.allows_attempt(attempt) {
            error!("SSE reconnection attempts exhausted, giving up");
            return;
        }

        let mut req = http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        for (key, value) in &headers {
            req = req.header(key, value);
        }
        if let Some(id) = last_event_id.lock().await.clone() {
            req = req.header("Last-Event-ID", id);
        }

        match req.send().await {
            Ok(response) if response.status().is_success() => {
                attempt = 0;
                info!("SSE stream connected");
                let closed = consume_sse_stream(
                    response,
                    &post_endpoint,
                    &endpoint_ready,
                    &last_event_id,
                    &tx,
                )
                .await;
                if closed.is_err() && tx.is_closed() {
                    return;
                }
            }
            Ok(response) => {
                warn!("SSE connect failed with status {}", response.status());
            }
            Err(e) => {
                warn!("SSE connect error: {e}");
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

/// Parse events out of one SSE response body until it closes. Returns `Err`
/// only to signal the caller to stop retrying (receiver dropped).
async fn consume_sse_stream(
    response: reqwest::Response,
    post_endpoint: &Arc<Mutex<Option<String>>>,
    endpoint_ready: &Arc<Notify>,
    last_event_id: &Arc<Mutex<Option<String>>>,
    tx: &mpsc::UnboundedSender<Frame>,
) -> std::result::Result<(), ()> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!("SSE stream error: {e}");
                break;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find("\n\n") {
            let raw_event = buffer[..pos].to_string();
            buffer.drain(..pos + 2);
            if let Some((event_name, data, id)) = parse_sse_event(&raw_event) {
                if let Some(id) = id {
                    *last_event_id.lock().await = Some(id);
                }
                match event_name.as_deref() {
                    Some("endpoint") => {
                        *post_endpoint.lock().await = Some(data);
                        endpoint_ready.notify_waiters();
                    }
                    _ => match Frame::parse(data.as_bytes()) {
                        Ok(frame) => {
                            if tx.send(frame).is_err() {
                                return Err(());
                            }
                        }
                        Err(e) => warn!("dropping unparseable SSE frame: {e}"),
                    },
                }
            }
        }
    }
    debug!("SSE stream closed");
    Ok(())
}

/// Parse one `\n`-delimited SSE event block into `(event, data, id)`.
/// Multi-line `data:` fields concatenate with `\n`; events without a `data:`
/// field are discarded, per spec §4.1.
fn parse_sse_event(raw: &str) -> Option<(Option<String>, String, Option<String>)> {
    let mut event = None;
    let mut data_lines = Vec::new();
    let mut id = None;

    for line in raw.split('\n') {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("id:") {
            id = Some(rest.trim().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some((event, data_lines.join("\n"), id))
}
