//! Common test helpers and utilities for RFM tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - A test host with RAII cleanup
//! - A raw frame client that timestamps everything it receives

use rfm_core::{codec, Message};
use rfm_host::{HostConfig, OperationHost};
use rfm_transport::{
    TransportEvent, TransportReceiver, TransportSender, TransportServer, WebSocketReceiver,
    WebSocketSender, WebSocketServer, WebSocketTransport, WireFrame,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// Test Host - RAII wrapper with proper cleanup
// ============================================================================

/// A test host that automatically shuts down on drop
pub struct TestHost {
    port: u16,
    host: Arc<OperationHost>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestHost {
    /// Start a test host with default configuration
    pub async fn start() -> Self {
        Self::start_with_config(HostConfig::default()).await
    }

    /// Start a test host with custom configuration
    pub async fn start_with_config(config: HostConfig) -> Self {
        let server = WebSocketServer::bind("127.0.0.1:0")
            .await
            .expect("test host bind failed");
        let port = server.local_addr().expect("no local addr").port();

        let host = Arc::new(OperationHost::new(config));
        let serving = Arc::clone(&host);
        let handle = tokio::spawn(async move {
            let _ = serving.serve_on(server).await;
        });

        Self {
            port,
            host,
            handle: Some(handle),
        }
    }

    /// Get the WebSocket URL for this host
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the host explicitly (also happens on drop)
    pub fn stop(&mut self) {
        self.host.stop();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Raw Client - frame-level access for protocol assertions
// ============================================================================

/// A frame received by [`RawClient`], with its arrival time
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    pub frame: WireFrame,
}

impl Received {
    /// Decode a text frame; binary frames yield `None`
    pub fn message(&self) -> Option<Message> {
        self.frame.as_text().map(codec::decode)
    }
}

/// Minimal client speaking raw frames
pub struct RawClient {
    pub sender: WebSocketSender,
    receiver: WebSocketReceiver,
    closed: bool,
}

impl RawClient {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::new()
            .open(url)
            .await
            .expect("raw client connect failed");
        Self {
            sender,
            receiver,
            closed: false,
        }
    }

    pub async fn send(&self, message: &Message) {
        let text = codec::encode(message).expect("encode failed");
        self.sender.send_text(text).await.expect("send failed");
    }

    pub async fn send_text(&self, text: &str) {
        self.sender
            .send_text(text.to_string())
            .await
            .expect("send failed");
    }

    /// Whether the peer has closed the connection
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next frame within `max_wait`
    pub async fn next(&mut self, max_wait: Duration) -> Option<Received> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(TransportEvent::Frame(frame))) => {
                    return Some(Received {
                        at: Instant::now(),
                        frame,
                    })
                }
                Ok(Some(TransportEvent::Disconnected { .. })) | Ok(None) => {
                    self.closed = true;
                    return None;
                }
                Ok(Some(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Next decoded message within `max_wait`
    pub async fn next_message(&mut self, max_wait: Duration) -> Option<Message> {
        self.next(max_wait).await.and_then(|r| r.message())
    }

    /// Collect `count` frames, or fewer if `max_wait` runs out first
    pub async fn collect(&mut self, count: usize, max_wait: Duration) -> Vec<Received> {
        let deadline = Instant::now() + max_wait;
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next(remaining).await {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    /// Collect everything that arrives within `window`
    pub async fn drain(&mut self, window: Duration) -> Vec<Received> {
        let deadline = Instant::now() + window;
        let mut frames = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.next(remaining).await {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    /// Assert that nothing arrives within `window`
    pub async fn expect_silence(&mut self, window: Duration) -> bool {
        self.next(window).await.is_none()
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}
