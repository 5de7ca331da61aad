//! End-to-end scenarios driving the [`fluxmcp_client::Client`] facade over an
//! in-memory duplex transport with a hand-played server peer, exercising the
//! literal wire payloads a compliant server/client pair must exchange.

use std::sync::Arc;
use std::time::Duration;

use fluxmcp_client::{
    CancelToken, Client, ClientConfig, ElicitationHandler, ElicitationOutcome, Frame,
    NotificationFrame, RequestFrame, RequestId, ResponseFrame,
};
use fluxmcp_transport::duplex_pair;
use serde_json::json;

fn client_over_duplex() -> (Client, fluxmcp_transport::DuplexTransport) {
    let (client_side, server_side) = duplex_pair();
    let client = Client::new_with_transport(Arc::new(client_side), ClientConfig::default());
    (client, server_side)
}

async fn answer_initialize(server: &fluxmcp_transport::DuplexTransport, capabilities: serde_json::Value) {
    server.start().await.unwrap();
    let frame = server.recv().await.unwrap().expect("initialize request arrives");
    let Frame::Request(req) = frame else { panic!("expected initialize request") };
    assert_eq!(req.method, "initialize");
    let result = json!({
        "protocolVersion": fluxmcp_client::PREFERRED_VERSION,
        "serverInfo": {"name": "test-server", "version": "1.0.0"},
        "capabilities": capabilities,
    });
    server
        .send(&Frame::Response(ResponseFrame::success(req.id, result)))
        .await
        .unwrap();
    let initialized = server.recv().await.unwrap().expect("notifications/initialized arrives");
    let Frame::Notification(n) = initialized else { panic!("expected notification") };
    assert_eq!(n.method, "notifications/initialized");
}

/// Scenario 1: arithmetic tool round-trip (spec §8 scenario 1).
#[tokio::test]
async fn arithmetic_tool_call_round_trips_to_text_three() {
    let (client, server) = client_over_duplex();

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({"tools": {}})).await;

        let frame = server.recv().await.unwrap().expect("tools/call arrives");
        let Frame::Request(req) = frame else { panic!("expected request") };
        assert_eq!(req.method, "tools/call");
        assert_eq!(
            req.params.unwrap(),
            json!({"name": "add", "arguments": {"a": 1, "b": 2}})
        );
        let result = json!({"content": [{"type": "text", "text": "3"}], "isError": false});
        server
            .send(&Frame::Response(ResponseFrame::success(req.id, result)))
            .await
            .unwrap();
    });

    client.start().await.unwrap();
    let outcome = client
        .execute_tool("add", json!({"a": 1, "b": 2}))
        .await
        .unwrap();
    assert!(!outcome.is_error);
    match &outcome.content[0] {
        fluxmcp_client::Content::Text { text } => assert_eq!(text, "3"),
        other => panic!("expected text content, got {other:?}"),
    }

    server_task.await.unwrap();
}

/// Scenario 2: a server-initiated `ping` is answered within one round-trip
/// (spec §8 scenario 2).
#[tokio::test]
async fn server_initiated_ping_is_answered() {
    let (client, server) = client_over_duplex();

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({})).await;

        let ping = Frame::Request(RequestFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            id: RequestId::String("x".to_string()),
            method: "ping".to_string(),
            params: None,
        });
        server.send(&ping).await.unwrap();

        let response = server.recv().await.unwrap().expect("ping reply arrives");
        let Frame::Response(resp) = response else { panic!("expected response") };
        assert_eq!(resp.id, RequestId::String("x".to_string()));
        assert_eq!(resp.result().unwrap(), &json!({}));
    });

    client.start().await.unwrap();
    server_task.await.unwrap();
}

/// Scenario 3: cancellation propagation (spec §8 scenario 3).
#[tokio::test]
async fn cancelling_a_stalled_tool_call_emits_one_cancelled_notice() {
    let (client, server) = client_over_duplex();

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({"tools": {}})).await;

        let frame = server.recv().await.unwrap().expect("tools/call arrives");
        assert!(matches!(frame, Frame::Request(_)));

        let cancelled = server.recv().await.unwrap().expect("cancellation notice arrives");
        let Frame::Notification(n) = cancelled else { panic!("expected notification") };
        assert_eq!(n.method, "notifications/cancelled");
        n.params.unwrap()["reason"].as_str().unwrap().to_string()
        // server never replies to tools/call: it "stalls" for the rest of the test
    });

    client.start().await.unwrap();

    let cancel = CancelToken::new();
    let cancel_for_task = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_for_task.cancel();
    });

    let result = client
        .execute_tool_cancellable("slow_tool", json!({}), &cancel)
        .await;
    assert!(matches!(result, Err(fluxmcp_protocol::Error::Cancelled)));

    server_task.await.unwrap();
}

/// Scenario 4: list-changed invalidation forces a fresh `tools/list` (spec
/// §8 scenario 4).
#[tokio::test]
async fn list_changed_notification_forces_a_fresh_tools_list() {
    let (client, server) = client_over_duplex();

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({"tools": {}})).await;

        for name in ["first", "second"] {
            let frame = server.recv().await.unwrap().expect("tools/list arrives");
            let Frame::Request(req) = frame else { panic!("expected request") };
            assert_eq!(req.method, "tools/list");
            let result = json!({"tools": [{"name": name, "inputSchema": {}}]});
            server
                .send(&Frame::Response(ResponseFrame::success(req.id, result)))
                .await
                .unwrap();

            if name == "first" {
                let notice = Frame::Notification(NotificationFrame {
                    jsonrpc: fluxmcp_protocol::JsonRpcVersion,
                    method: "notifications/tools/list_changed".to_string(),
                    params: None,
                });
                server.send(&notice).await.unwrap();
            }
        }
    });

    client.start().await.unwrap();
    let first = client.tools().await.unwrap();
    assert_eq!(first[0].name, "first");

    // give the notification a moment to flush the catalog before the second read
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = client.tools().await.unwrap();
    assert_eq!(second[0].name, "second");

    server_task.await.unwrap();
}

/// Scenario 5: pagination merges three pages into exactly three requests
/// (spec §8 scenario 5).
#[tokio::test]
async fn pagination_merges_three_pages_into_three_requests() {
    let (client, server) = client_over_duplex();

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({"tools": {}})).await;

        let pages = [
            (json!([{"name": "a", "inputSchema": {}}]), Some("c1")),
            (json!([{"name": "b", "inputSchema": {}}]), Some("c2")),
            (json!([{"name": "c", "inputSchema": {}}]), None::<&str>),
        ];
        for (tools, cursor) in pages {
            let frame = server.recv().await.unwrap().expect("tools/list arrives");
            let Frame::Request(req) = frame else { panic!("expected request") };
            let mut result = json!({"tools": tools});
            if let Some(c) = cursor {
                result["nextCursor"] = json!(c);
            }
            server
                .send(&Frame::Response(ResponseFrame::success(req.id, result)))
                .await
                .unwrap();
        }
    });

    client.start().await.unwrap();
    let tools = client.tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    server_task.await.unwrap();
}

/// Scenario 6: deferred elicitation completed 100 ms later by an external
/// caller (spec §8 scenario 6).
#[tokio::test]
async fn deferred_elicitation_completes_after_external_call() {
    struct Defer;
    #[async_trait::async_trait]
    impl ElicitationHandler for Defer {
        async fn handle(&self, _request: &fluxmcp_client::ElicitRequest) -> ElicitationOutcome {
            ElicitationOutcome::Pending
        }
    }

    let (client, server) = client_over_duplex();
    client.on_elicitation(Arc::new(Defer));

    let server_task = tokio::spawn(async move {
        answer_initialize(&server, json!({})).await;

        let request = Frame::Request(RequestFrame {
            jsonrpc: fluxmcp_protocol::JsonRpcVersion,
            id: RequestId::String("elicit-1".to_string()),
            method: "elicitation/create".to_string(),
            params: Some(json!({
                "message": "confirm?",
                "requestedSchema": {
                    "type": "object",
                    "required": ["confirmed"],
                    "properties": {"confirmed": {"type": "boolean"}},
                },
            })),
        });
        server.send(&request).await.unwrap();

        let response = server.recv().await.unwrap().expect("elicitation response arrives");
        let Frame::Response(resp) = response else { panic!("expected response") };
        assert_eq!(resp.id, RequestId::String("elicit-1".to_string()));
        assert_eq!(
            resp.result().unwrap(),
            &json!({"action": "accept", "content": {"confirmed": true}})
        );
    });

    client.start().await.unwrap();

    // give the server's elicitation/create request time to reach the deferred
    // registry before completing it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client
        .complete_elicitation(RequestId::String("elicit-1".to_string()), json!({"confirmed": true}))
        .await
        .unwrap();

    server_task.await.unwrap();
}
