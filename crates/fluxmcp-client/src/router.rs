//! Message Router (spec §4.2): correlates outbound requests with their
//! responses and dispatches inbound frames, grounded in the teacher's
//! `MessageDispatcher` (`turbomcp-client/src/client/dispatcher.rs`) — a
//! single background task is the sole consumer of `transport.recv()`, with
//! response waiters registered *before* the request is sent so no response
//! can race its own registration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use fluxmcp_protocol::{
    Error, Frame, NotificationFrame, RequestFrame, RequestId, Result, ResponseFrame, RpcError,
};
use fluxmcp_transport::Transport;
use serde_json::Value;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, error, trace, warn};

/// Handles a single inbound request (ping/roots/sampling/elicitation) and
/// produces the reply to send back, or `None` if the reply will be sent
/// later out-of-band (a deferred elicitation).
#[async_trait]
pub trait RequestDispatch: Send + Sync {
    async fn handle_request(
        &self,
        id: RequestId,
        method: String,
        params: Option<Value>,
    ) -> Option<ResponseFrame>;
}

/// Handles a single inbound notification.
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn handle_notification(&self, method: String, params: Option<Value>);
}

/// Receives `notifications/cancelled` for an inbound request id the router's
/// own in-flight table (which only tracks *outbound* requests) doesn't know
/// about — the elicitation/sampling deferred registries.
#[async_trait]
pub trait InboundCancelSink: Send + Sync {
    async fn cancel(&self, id: RequestId, reason: Option<String>);
}

struct InFlightEntry {
    deadline: Option<Instant>,
    waker: oneshot::Sender<Result<Value>>,
}

/// Host-facing handle to cancel a single in-flight outbound request (spec
/// §5 "Host-side cancellation"). Cheap to clone; cancelling twice, or after
/// the request has already resolved, is a no-op.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<Notify>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    /// Signal cancellation. Whoever is awaiting the matching
    /// [`MessageRouter::send_request_cancellable`] call observes
    /// [`Error::Cancelled`] and the router fires a best-effort
    /// `notifications/cancelled` toward the peer.
    pub fn cancel(&self) {
        self.0.notify_waiters();
    }
}

/// Routes frames between the transport and whichever side of the protocol
/// is waiting on them: outbound-request callers, inbound-request handlers,
/// and notification handlers.
pub struct MessageRouter {
    transport: Arc<dyn Transport>,
    in_flight: DashMap<RequestId, InFlightEntry>,
    next_id: std::sync::atomic::AtomicI64,
    request_dispatch: std::sync::RwLock<Option<Arc<dyn RequestDispatch>>>,
    notification_dispatch: std::sync::RwLock<Option<Arc<dyn NotificationDispatch>>>,
    cancel_sink: std::sync::RwLock<Option<Arc<dyn InboundCancelSink>>>,
    shutdown: Arc<Notify>,
    /// Guards [`Self::start`] so retried callers (`Coordinator::start`'s
    /// retry loop calls it once per attempt, on the same router instance)
    /// spawn the routing loop at most once.
    started: std::sync::atomic::AtomicBool,
}

impl MessageRouter {
    /// Build a router over `transport`. Call [`MessageRouter::start`] once
    /// the handlers have been installed to begin the background routing task.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            in_flight: DashMap::new(),
            next_id: std::sync::atomic::AtomicI64::new(1),
            request_dispatch: std::sync::RwLock::new(None),
            notification_dispatch: std::sync::RwLock::new(None),
            cancel_sink: std::sync::RwLock::new(None),
            shutdown: Arc::new(Notify::new()),
            started: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn set_request_dispatch(&self, dispatch: Arc<dyn RequestDispatch>) {
        *self.request_dispatch.write().expect("request_dispatch poisoned") = Some(dispatch);
    }

    pub fn set_notification_dispatch(&self, dispatch: Arc<dyn NotificationDispatch>) {
        *self
            .notification_dispatch
            .write()
            .expect("notification_dispatch poisoned") = Some(dispatch);
    }

    pub fn set_cancel_sink(&self, sink: Arc<dyn InboundCancelSink>) {
        *self.cancel_sink.write().expect("cancel_sink poisoned") = Some(sink);
    }

    /// Start the single background task that is the sole consumer of
    /// `transport.recv()`. Idempotent: `Coordinator::start`'s retry loop may
    /// call this once per attempt on the same router, and only the first
    /// call actually spawns the routing loop.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        let router = self.clone();
        tokio::spawn(async move { router.routing_loop().await });
    }

    /// Best-effort `notifications/cancelled` for every in-flight request,
    /// used by [`crate::coordinator::Coordinator::stop`] (spec §4.3: "send
    /// best-effort `notifications/cancelled` for each in-flight id with
    /// reason `client shutdown`").
    pub async fn cancel_all(&self, reason: &str) {
        let ids: Vec<RequestId> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel(&id, reason).await;
        }
    }

    /// Stop the routing task and fail every outstanding waiter.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        for entry in self.in_flight.iter() {
            trace!("router shutdown abandoning in-flight request {}", entry.key());
        }
        self.in_flight.clear();
    }

    /// Send `method`/`params` as a new request, waiting up to `timeout` for
    /// the matching response.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();

        // Insert before send: a response racing in before we've registered
        // the waiter would otherwise be logged-and-dropped as "unknown id".
        self.in_flight.insert(
            id.clone(),
            InFlightEntry {
                deadline: Some(Instant::now() + timeout),
                waker: tx,
            },
        );

        let frame = Frame::Request(RequestFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            id: id.clone(),
            method: method.to_string(),
            params,
        });

        debug!("-> request {id} {method}");
        if let Err(e) = self.transport.send(&frame).await {
            self.in_flight.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::transport("router shut down before a response arrived")),
            Err(_) => {
                self.in_flight.remove(&id);
                self.best_effort_cancel_notice(&id, "timeout").await;
                Err(Error::TimeoutError {
                    request_id: id.to_string(),
                })
            }
        }
    }

    /// Like [`Self::send_request`], but `cancel` may be signalled by the host
    /// at any time before the response arrives; cancellation takes priority
    /// over the timeout and resolves the caller with [`Error::Cancelled`]
    /// (spec §8 scenario 3: "host cancels after 100 ms... the caller observes
    /// `Cancelled`").
    pub async fn send_request_cancellable(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();

        self.in_flight.insert(
            id.clone(),
            InFlightEntry {
                deadline: Some(Instant::now() + timeout),
                waker: tx,
            },
        );

        let frame = Frame::Request(RequestFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            id: id.clone(),
            method: method.to_string(),
            params,
        });

        debug!("-> request {id} {method} (cancellable)");
        if let Err(e) = self.transport.send(&frame).await {
            self.in_flight.remove(&id);
            return Err(e);
        }

        tokio::select! {
            result = tokio::time::timeout(timeout, rx) => match result {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(Error::transport("router shut down before a response arrived")),
                Err(_) => {
                    self.in_flight.remove(&id);
                    self.best_effort_cancel_notice(&id, "timeout").await;
                    Err(Error::TimeoutError { request_id: id.to_string() })
                }
            },
            () = cancel.0.notified() => {
                if let Some((_, entry)) = self.in_flight.remove(&id) {
                    self.best_effort_cancel_notice(&id, "client cancelled").await;
                    let _ = entry.waker.send(Err(Error::Cancelled));
                }
                Err(Error::Cancelled)
            }
        }
    }

    /// Host-initiated cancellation of an outbound request still in flight.
    pub async fn cancel(&self, id: &RequestId, reason: &str) {
        if let Some((_, entry)) = self.in_flight.remove(id) {
            self.best_effort_cancel_notice(id, reason).await;
            let _ = entry.waker.send(Err(Error::Cancelled));
        }
    }

    async fn best_effort_cancel_notice(&self, id: &RequestId, reason: &str) {
        let notification = Frame::Notification(NotificationFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            method: "notifications/cancelled".to_string(),
            params: Some(serde_json::json!({ "requestId": id, "reason": reason })),
        });
        if let Err(e) = self.transport.send(&notification).await {
            warn!("best-effort notifications/cancelled send failed: {e}");
        }
    }

    /// Send a fire-and-forget notification to the peer.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let frame = Frame::Notification(NotificationFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            method: method.to_string(),
            params,
        });
        self.transport.send(&frame).await
    }

    /// Send a response frame directly — used by deferred inbound handlers
    /// (elicitation `complete`/`cancel`, sampling completion) that reply
    /// outside the immediate `handle_request` return path.
    pub async fn send_response(&self, response: ResponseFrame) -> Result<()> {
        self.transport.send(&Frame::Response(response)).await
    }

    async fn routing_loop(self: Arc<Self>) {
        debug!("router routing loop started");
        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    debug!("router routing loop shutting down");
                    return;
                }
                result = self.transport.recv() => {
                    match result {
                        Ok(Some(frame)) => self.route(frame).await,
                        Ok(None) => {
                            debug!("transport closed, router routing loop exiting");
                            self.shutdown();
                            return;
                        }
                        Err(e) => {
                            error!("transport recv error: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn route(self: &Arc<Self>, frame: Frame) {
        match frame {
            Frame::Response(response) => self.route_response(response),
            Frame::Request(request) => self.route_request(request),
            Frame::Notification(notification) => self.route_notification(notification).await,
        }
    }

    fn route_response(&self, response: ResponseFrame) {
        let Some((_, entry)) = self.in_flight.remove(&response.id) else {
            warn!("dropping response for unknown request id {}", response.id);
            return;
        };
        let result = match (response.result(), response.error()) {
            (Some(value), _) => Ok(value.clone()),
            (None, Some(err)) => Err(Error::from(err.clone())),
            (None, None) => Err(Error::invalid_format("response had neither result nor error")),
        };
        let _ = entry.waker.send(result);
    }

    fn route_request(self: &Arc<Self>, request: RequestFrame) {
        let router = self.clone();
        tokio::spawn(async move {
            let dispatch = router.request_dispatch.read().expect("poisoned").clone();
            let response = match dispatch {
                Some(dispatch) => {
                    dispatch
                        .handle_request(request.id.clone(), request.method.clone(), request.params)
                        .await
                }
                None => Some(ResponseFrame::failure(
                    request.id.clone(),
                    RpcError::method_not_found(&request.method),
                )),
            };
            if let Some(response) = response {
                if let Err(e) = router.send_response(response).await {
                    error!("failed to send response to inbound request {}: {e}", request.id);
                }
            }
        });
    }

    async fn route_notification(self: &Arc<Self>, notification: NotificationFrame) {
        if notification.method == "notifications/cancelled" {
            self.route_cancelled(notification.params).await;
            return;
        }
        let dispatch = self
            .notification_dispatch
            .read()
            .expect("poisoned")
            .clone();
        if let Some(dispatch) = dispatch {
            dispatch
                .handle_notification(notification.method, notification.params)
                .await;
        } else {
            warn!("dropping notification {} with no handler installed", notification.method);
        }
    }

    async fn route_cancelled(self: &Arc<Self>, params: Option<Value>) {
        let Some(params) = params else {
            warn!("notifications/cancelled with no params");
            return;
        };
        let Some(request_id) = params.get("requestId").cloned() else {
            warn!("notifications/cancelled missing requestId");
            return;
        };
        let Ok(id): std::result::Result<RequestId, _> = serde_json::from_value(request_id) else {
            warn!("notifications/cancelled requestId was not a valid id");
            return;
        };
        let reason = params
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some((_, entry)) = self.in_flight.remove(&id) {
            let _ = entry.waker.send(Err(Error::Cancelled));
            return;
        }

        let sink = self.cancel_sink.read().expect("poisoned").clone();
        if let Some(sink) = sink {
            sink.cancel(id, reason).await;
        }
    }
}
