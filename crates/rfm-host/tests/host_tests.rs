//! Operation host tests
//!
//! Tests for the host covering:
//! - PING/PONG with client timestamps
//! - The canned progress sequence and its pacing
//! - Cancel acknowledgement in both cancellation modes
//! - Byte-identical echo of everything else
//! - Connection independence and shutdown

use bytes::Bytes;
use rfm_core::{time, Message};
use rfm_host::{CancellationMode, HostConfig, OperationHost};
use rfm_test_utils::{
    find_available_port, wait_for, RawClient, TestHost, DEFAULT_CHECK_INTERVAL, DEFAULT_TIMEOUT,
};
use rfm_transport::{TransportSender, WireFrame};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> HostConfig {
    HostConfig {
        progress_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Decode frames, panicking on binary
fn messages(frames: &[rfm_test_utils::Received]) -> Vec<Message> {
    frames
        .iter()
        .map(|f| f.message().expect("expected a text frame"))
        .collect()
}

fn assert_sequence(messages: &[Message], operation_id: &str) {
    assert_eq!(messages.len(), 7, "Expected 7 frames, got {:?}", messages);

    match &messages[0] {
        Message::OperationStarted(m) => {
            assert_eq!(m.operation.operation_id, operation_id);
            assert_eq!(m.operation.operation_type, "test");
            assert_eq!(m.operation.name, "Test Operation");
        }
        other => panic!("Expected operation_started, got {:?}", other),
    }

    let progress: Vec<u8> = messages[1..6]
        .iter()
        .map(|m| match m {
            Message::ProgressUpdate(p) => {
                assert_eq!(p.data.operation_id, operation_id);
                assert_eq!(p.data.status, "running");
                p.data.progress
            }
            other => panic!("Expected progress_update, got {:?}", other),
        })
        .collect();
    assert_eq!(progress, vec![0, 25, 50, 75, 100]);

    match &messages[6] {
        Message::OperationCompleted(m) => assert_eq!(m.operation_id, operation_id),
        other => panic!("Expected operation_completed, got {:?}", other),
    }
}

// ============================================================================
// PING
// ============================================================================

#[tokio::test]
async fn test_ping_gets_single_pong() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    let before = time::now();
    client.send(&Message::ping(before)).await;

    match client.next_message(DEFAULT_TIMEOUT).await {
        Some(Message::Pong(pong)) => {
            assert!(pong.timestamp >= before, "Pong timestamp predates ping");
            assert_eq!(pong.client_timestamp, Some(before));
        }
        other => panic!("Expected pong, got {:?}", other),
    }

    assert!(
        client.expect_silence(Duration::from_millis(200)).await,
        "Only one pong should be sent"
    );
}

#[tokio::test]
async fn test_ping_without_timestamp() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send_text(r#"{"type":"ping"}"#).await;

    match client.next_message(DEFAULT_TIMEOUT).await {
        Some(Message::Pong(pong)) => assert_eq!(pong.client_timestamp, None),
        other => panic!("Expected pong, got {:?}", other),
    }
}

// ============================================================================
// TEST_OPERATION
// ============================================================================

#[tokio::test]
async fn test_operation_sequence() {
    let host = TestHost::start_with_config(fast_config()).await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("op-7", time::now())).await;

    let frames = client.collect(7, DEFAULT_TIMEOUT).await;
    assert_sequence(&messages(&frames), "op-7");

    assert!(
        client.expect_silence(Duration::from_millis(200)).await,
        "Nothing should follow operation_completed"
    );
}

#[tokio::test]
async fn test_operation_default_id() {
    let host = TestHost::start_with_config(fast_config()).await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send_text(r#"{"type":"test_operation"}"#).await;

    let frames = client.collect(7, DEFAULT_TIMEOUT).await;
    assert_sequence(&messages(&frames), "unknown");
}

#[tokio::test]
async fn test_progress_pacing() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("paced", time::now())).await;

    let frames = client.collect(7, DEFAULT_TIMEOUT).await;
    let messages = messages(&frames);
    assert_sequence(&messages, "paced");

    // The first progress frame is also delayed
    let first_gap = frames[1].at.duration_since(frames[0].at);
    assert!(
        first_gap >= Duration::from_millis(450),
        "First progress came after {:?}",
        first_gap
    );

    let stamps: Vec<f64> = messages[1..6]
        .iter()
        .filter_map(|m| match m {
            Message::ProgressUpdate(p) => Some(p.data.timestamp),
            _ => None,
        })
        .collect();
    for pair in stamps.windows(2) {
        assert!(
            pair[1] - pair[0] >= 0.49,
            "Progress timestamps too close: {:?}",
            pair
        );
    }
}

#[tokio::test]
async fn test_frames_after_operation_are_delayed() {
    let host = TestHost::start_with_config(fast_config()).await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("first", time::now())).await;
    client.send(&Message::ping(time::now())).await;

    // Detached mode handles frames strictly in order
    let frames = client.collect(8, DEFAULT_TIMEOUT).await;
    let messages = messages(&frames);
    assert_sequence(&messages[..7], "first");
    assert!(matches!(messages[7], Message::Pong(_)));
}

// ============================================================================
// CANCEL_OPERATION
// ============================================================================

#[tokio::test]
async fn test_cancel_acknowledged() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    let before = time::now();
    client.send(&Message::cancel_operation("X", before)).await;

    match client.next_message(DEFAULT_TIMEOUT).await {
        Some(Message::OperationCanceled(m)) => {
            assert_eq!(m.operation_id.as_deref(), Some("X"));
            assert!(m.details.cancellation_time >= before);
        }
        other => panic!("Expected operation_canceled, got {:?}", other),
    }

    assert!(client.expect_silence(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_cancel_without_id_reports_null() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send_text(r#"{"type":"cancel_operation"}"#).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No reply");
    let text = frame.frame.as_text().expect("text reply").to_string();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "operation_canceled");
    assert!(value["operation_id"].is_null());
    assert!(value["details"]["cancellation_time"].is_number());
}

#[tokio::test]
async fn test_detached_cancel_answered_after_completion() {
    let host = TestHost::start_with_config(fast_config()).await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("busy", time::now())).await;
    client.send(&Message::cancel_operation("busy", time::now())).await;

    let frames = client.collect(8, DEFAULT_TIMEOUT).await;
    let messages = messages(&frames);
    assert_sequence(&messages[..7], "busy");
    match &messages[7] {
        Message::OperationCanceled(m) => assert_eq!(m.operation_id.as_deref(), Some("busy")),
        other => panic!("Expected operation_canceled, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cooperative_cancel_stops_progress() {
    let host = TestHost::start_with_config(HostConfig {
        progress_interval: Duration::from_millis(200),
        cancellation: CancellationMode::Cooperative,
        ..Default::default()
    })
    .await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("stoppable", time::now())).await;

    match client.next_message(DEFAULT_TIMEOUT).await {
        Some(Message::OperationStarted(_)) => {}
        other => panic!("Expected operation_started, got {:?}", other),
    }

    client.send(&Message::cancel_operation("stoppable", time::now())).await;

    let rest = messages(&client.drain(Duration::from_millis(1500)).await);
    assert!(
        rest.iter()
            .any(|m| matches!(m, Message::OperationCanceled(_))),
        "Cancel should be acknowledged"
    );
    assert!(
        !rest
            .iter()
            .any(|m| matches!(m, Message::OperationCompleted(_))),
        "Canceled operation must not complete: {:?}",
        rest
    );
    let progress_frames = rest
        .iter()
        .filter(|m| matches!(m, Message::ProgressUpdate(_)))
        .count();
    assert!(progress_frames < 5, "Progress kept flowing after cancel");
}

#[tokio::test]
async fn test_cooperative_ping_during_operation() {
    let host = TestHost::start_with_config(HostConfig {
        progress_interval: Duration::from_millis(100),
        cancellation: CancellationMode::Cooperative,
        ..Default::default()
    })
    .await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send(&Message::test_operation("bg", time::now())).await;
    client.send(&Message::ping(time::now())).await;

    let frames = messages(&client.collect(8, DEFAULT_TIMEOUT).await);
    let pong_at = frames
        .iter()
        .position(|m| matches!(m, Message::Pong(_)))
        .expect("Pong missing");
    assert!(pong_at < 7, "Pong should not wait for the sequence");
}

// ============================================================================
// Echo
// ============================================================================

#[tokio::test]
async fn test_echo_non_json_text() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send_text("hello").await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame, WireFrame::Text("hello".to_string()));
}

#[tokio::test]
async fn test_echo_unknown_type_is_byte_identical() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    let original = r#"{ "type" : "list_operations",  "x": [1, 2.50] }"#;
    client.send_text(original).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame.as_text(), Some(original));
}

#[tokio::test]
async fn test_echo_object_without_type() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    client.send_text(r#"{"hello":"world"}"#).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame.as_text(), Some(r#"{"hello":"world"}"#));
}

#[tokio::test]
async fn test_echo_response_kinds() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    let original = r#"{"type":"pong","timestamp":1.0}"#;
    client.send_text(original).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame.as_text(), Some(original));
}

#[tokio::test]
async fn test_echo_binary() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    let payload = Bytes::from_static(b"\x00\x01raw");
    client
        .sender
        .send(WireFrame::Binary(payload.clone()))
        .await
        .unwrap();

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame, WireFrame::Binary(payload));
}

#[tokio::test]
async fn test_malformed_known_type_is_echoed() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    // operation_id must be a string
    let original = r#"{"type":"test_operation","operation_id":42}"#;
    client.send_text(original).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No echo");
    assert_eq!(frame.frame.as_text(), Some(original));
    assert!(client.expect_silence(Duration::from_millis(200)).await);
}

// ============================================================================
// Connections
// ============================================================================

#[tokio::test]
async fn test_greeting_when_announcing() {
    let host = TestHost::start_with_config(HostConfig {
        announce_connections: true,
        ..Default::default()
    })
    .await;
    let mut client = RawClient::connect(&host.url()).await;

    let frame = client.next(DEFAULT_TIMEOUT).await.expect("No greeting");
    let value: serde_json::Value =
        serde_json::from_str(frame.frame.as_text().expect("text greeting")).unwrap();
    assert_eq!(value["type"], "connection_status");
    assert_eq!(value["status"], "connected");
    assert!(value["connection_id"].is_string());
}

#[tokio::test]
async fn test_no_greeting_by_default() {
    let host = TestHost::start().await;
    let mut client = RawClient::connect(&host.url()).await;

    assert!(client.expect_silence(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn test_connections_are_independent() {
    let host = TestHost::start_with_config(HostConfig {
        progress_interval: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    let mut busy = RawClient::connect(&host.url()).await;
    let mut idle = RawClient::connect(&host.url()).await;

    busy.send(&Message::test_operation("a", time::now())).await;
    idle.send(&Message::ping(time::now())).await;

    // The idle client is answered while the busy one is still mid-sequence
    match idle.next_message(Duration::from_millis(300)).await {
        Some(Message::Pong(_)) => {}
        other => panic!("Expected pong, got {:?}", other),
    }

    let frames = busy.collect(7, DEFAULT_TIMEOUT).await;
    assert_sequence(&messages(&frames), "a");
}

#[tokio::test]
async fn test_client_disconnect_mid_operation() {
    let host = TestHost::start_with_config(fast_config()).await;

    {
        let client = RawClient::connect(&host.url()).await;
        client.send(&Message::test_operation("gone", time::now())).await;
        client.close().await;
    }

    // The host keeps serving new connections
    let mut client = RawClient::connect(&host.url()).await;
    client.send(&Message::ping(time::now())).await;
    assert!(matches!(
        client.next_message(DEFAULT_TIMEOUT).await,
        Some(Message::Pong(_))
    ));
}

#[tokio::test]
async fn test_idle_tcp_peer_does_not_block_accept() {
    let host = TestHost::start().await;

    // Opens TCP but never sends the upgrade request
    let _idle = tokio::net::TcpStream::connect(("127.0.0.1", host.port()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let answered = tokio::time::timeout(Duration::from_secs(3), async {
        let mut client = RawClient::connect(&host.url()).await;
        client.send(&Message::ping(time::now())).await;
        client.next_message(DEFAULT_TIMEOUT).await
    })
    .await;

    match answered {
        Ok(Some(Message::Pong(_))) => {}
        other => panic!("Expected a pong while the idle peer is open, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_ends_serve() {
    let host = Arc::new(OperationHost::new(HostConfig::default()));
    let server = rfm_transport::WebSocketServer::bind("127.0.0.1:0")
        .await
        .unwrap();

    let serving = Arc::clone(&host);
    let handle = tokio::spawn(async move { serving.serve_on(server).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    host.stop();
    assert!(host.is_stopped());

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("serve_on did not return after stop")
        .expect("serve task panicked");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_serve_websocket_bind_conflict() {
    let host = TestHost::start().await;
    let second = OperationHost::default();

    let result = second
        .serve_websocket(&format!("127.0.0.1:{}", host.port()))
        .await;
    assert!(result.is_err(), "Binding an occupied port should fail");
}

#[tokio::test]
async fn test_serve_websocket_on_port() {
    let port = find_available_port().await;
    let host = Arc::new(OperationHost::default());

    let serving = Arc::clone(&host);
    let addr = format!("127.0.0.1:{}", port);
    let handle = tokio::spawn(async move { serving.serve_websocket(&addr).await });

    let ready = wait_for(
        || async move {
            tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
        },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await;
    assert!(ready, "Host never started listening");

    let mut client = RawClient::connect(&format!("ws://127.0.0.1:{}", port)).await;
    client.send(&Message::ping(time::now())).await;
    assert!(matches!(
        client.next_message(DEFAULT_TIMEOUT).await,
        Some(Message::Pong(_))
    ));

    host.stop();
    handle.abort();
}
