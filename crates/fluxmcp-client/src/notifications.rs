//! Notification Handlers (spec §4.5): dispatch on a server-sent
//! notification's `method`. `notifications/cancelled` is handled at the
//! router level (spec §4.2) and never reaches here.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fluxmcp_protocol::{LogLevel, LogMessage, Progress};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::router::NotificationDispatch;

/// Host collaborator invoked for `notifications/progress` (spec §6).
#[async_trait]
pub trait ProgressHandler: Send + Sync {
    async fn on_progress(&self, progress: Progress);
}

/// Host collaborator invoked for `notifications/message`, gated by the
/// configured minimum [`LogLevel`] (spec §6 `Logger`).
#[async_trait]
pub trait LoggingHandler: Send + Sync {
    async fn on_log(&self, message: LogMessage);
}

/// Dispatches inbound notifications to catalog invalidation and host hooks.
/// Holds an `Arc<Catalog>` rather than owning it — the catalog is also
/// reachable from the facade for reads, matching spec §3's ownership note
/// ("the Catalog shares references to the Session... but does not own it").
pub struct NotificationRouter {
    catalog: Arc<Catalog>,
    progress: RwLock<Option<Arc<dyn ProgressHandler>>>,
    logging: RwLock<Option<Arc<dyn LoggingHandler>>>,
    logging_level: RwLock<LogLevel>,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, logging_level: LogLevel) -> Self {
        Self {
            catalog,
            progress: RwLock::new(None),
            logging: RwLock::new(None),
            logging_level: RwLock::new(logging_level),
        }
    }

    pub fn set_progress_handler(&self, handler: Arc<dyn ProgressHandler>) {
        *self.progress.write().expect("poisoned") = Some(handler);
    }

    pub fn set_logging_handler(&self, handler: Arc<dyn LoggingHandler>) {
        *self.logging.write().expect("poisoned") = Some(handler);
    }

    pub fn set_logging_level(&self, level: LogLevel) {
        *self.logging_level.write().expect("poisoned") = level;
    }
}

#[async_trait]
impl NotificationDispatch for NotificationRouter {
    async fn handle_notification(&self, method: String, params: Option<Value>) {
        match method.as_str() {
            "notifications/tools/list_changed" => {
                debug!("tools list changed, flushing catalog");
                self.catalog.flush_tools();
            }
            "notifications/resources/list_changed" => {
                debug!("resources list changed, flushing catalog");
                self.catalog.flush_resources();
            }
            "notifications/resource_templates/list_changed" => {
                debug!("resource templates list changed, flushing catalog");
                self.catalog.flush_resource_templates();
            }
            "notifications/prompts/list_changed" => {
                debug!("prompts list changed, flushing catalog");
                self.catalog.flush_prompts();
            }
            "notifications/resources/updated" => {
                let Some(uri) = params.as_ref().and_then(|p| p.get("uri")).and_then(Value::as_str)
                else {
                    warn!("notifications/resources/updated missing uri");
                    return;
                };
                debug!("resource {uri} updated, clearing cached content");
                self.catalog.clear_resource_content(uri);
            }
            "notifications/message" => self.handle_log(params).await,
            "notifications/progress" => self.handle_progress(params).await,
            other => debug!("discarding unknown notification: {other}"),
        }
    }
}

impl NotificationRouter {
    async fn handle_log(&self, params: Option<Value>) {
        let Some(params) = params else {
            warn!("notifications/message with no params");
            return;
        };
        let message: LogMessage = match serde_json::from_value(params) {
            Ok(m) => m,
            Err(e) => {
                warn!("unparseable notifications/message: {e}");
                return;
            }
        };
        if message.level < *self.logging_level.read().expect("poisoned") {
            return;
        }
        let handler = self.logging.read().expect("poisoned").clone();
        if let Some(handler) = handler {
            tokio::spawn(async move { handler.on_log(message).await });
        }
    }

    async fn handle_progress(&self, params: Option<Value>) {
        let Some(params) = params else {
            warn!("notifications/progress with no params");
            return;
        };
        let progress: Progress = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                warn!("unparseable notifications/progress: {e}");
                return;
            }
        };
        let handler = self.progress.read().expect("poisoned").clone();
        if let Some(handler) = handler {
            tokio::spawn(async move { handler.on_progress(progress).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use fluxmcp_transport::duplex_pair;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_catalog() -> Arc<Catalog> {
        let (client_side, _server_side) = duplex_pair();
        let coordinator =
            Coordinator::new_with_transport(Arc::new(client_side), crate::config::ClientConfig::default());
        Arc::new(Catalog::new(coordinator))
    }

    #[tokio::test]
    async fn list_changed_flushes_the_right_catalog() {
        let catalog = test_catalog();
        catalog.seed_tools_for_test(vec![fluxmcp_protocol::Tool {
            name: "add".to_string(),
            description: None,
            input_schema: serde_json::json!({}),
            output_schema: None,
        }]);
        assert!(catalog.tools_populated_for_test());

        let router = NotificationRouter::new(Arc::clone(&catalog), LogLevel::Info);
        router
            .handle_notification("notifications/tools/list_changed".to_string(), None)
            .await;
        assert!(!catalog.tools_populated_for_test());
    }

    #[tokio::test]
    async fn progress_below_logging_threshold_is_dropped_silently() {
        struct Flag(Arc<AtomicBool>);
        #[async_trait]
        impl LoggingHandler for Flag {
            async fn on_log(&self, _message: LogMessage) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let catalog = test_catalog();
        let router = NotificationRouter::new(catalog, LogLevel::Error);
        let fired = Arc::new(AtomicBool::new(false));
        router.set_logging_handler(Arc::new(Flag(Arc::clone(&fired))));

        router
            .handle_notification(
                "notifications/message".to_string(),
                Some(serde_json::json!({"level": "debug", "data": "hi"})),
            )
            .await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
