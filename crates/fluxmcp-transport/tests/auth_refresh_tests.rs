//! Exercises the `AuthProvider` 401-refresh-retry path on the HTTP-based
//! transports against a real (mocked) server, grounded in the teacher's
//! wiremock-based transport tests
//! (`turbomcp-transport/tests/streamable_http_client_tests.rs`).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use fluxmcp_protocol::{Frame, JsonRpcVersion, RequestFrame, RequestId};
use fluxmcp_transport::{AuthProvider, HttpConfig, StreamableHttpTransport, Transport};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An `AuthProvider` that starts with a stale token and becomes valid the
/// moment `refresh` is called, counting both calls for assertions.
struct FlakyAuth {
    token: std::sync::Mutex<String>,
    refresh_calls: AtomicU32,
}

impl FlakyAuth {
    fn new() -> Self {
        Self {
            token: std::sync::Mutex::new("stale-token".to_string()),
            refresh_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AuthProvider for FlakyAuth {
    async fn authorize(&self, _request: &serde_json::Value) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.token.lock().unwrap()),
        );
        headers
    }

    async fn refresh(&self) -> bool {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = "fresh-token".to_string();
        true
    }
}

fn ping_request() -> Frame {
    Frame::Request(RequestFrame {
        jsonrpc: JsonRpcVersion,
        id: RequestId::Number(1),
        method: "ping".to_string(),
        params: None,
    })
}

#[tokio::test]
async fn streamable_http_refreshes_and_retries_after_401() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(FlakyAuth::new());
    let transport = StreamableHttpTransport::new(HttpConfig {
        url: format!("{}/mcp", server.uri()),
        auth: Some(auth.clone() as Arc<dyn AuthProvider>),
        ..HttpConfig::default()
    });

    transport.send(&ping_request()).await.unwrap();

    assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn streamable_http_gives_up_when_refresh_fails() {
    struct DeadAuth;

    #[async_trait]
    impl AuthProvider for DeadAuth {
        async fn authorize(&self, _request: &serde_json::Value) -> HashMap<String, String> {
            HashMap::new()
        }

        async fn refresh(&self) -> bool {
            false
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(HttpConfig {
        url: format!("{}/mcp", server.uri()),
        auth: Some(Arc::new(DeadAuth) as Arc<dyn AuthProvider>),
        ..HttpConfig::default()
    });

    let err = transport.send(&ping_request()).await.unwrap_err();
    assert!(matches!(err, fluxmcp_protocol::Error::TransportFailed(_)));
}
