//! Scenario-driving probe client

use rfm_core::{codec, time, Message, MessageKind, DEFAULT_WS_URL};
use rfm_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, WebSocketReceiver,
    WebSocketSender, WebSocketTransport, WireFrame,
};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{ProbeError, Result};

/// Kinds a passing run must have observed
pub const EXPECTED_TAGS: [MessageKind; 5] = [
    MessageKind::Pong,
    MessageKind::OperationStarted,
    MessageKind::ProgressUpdate,
    MessageKind::OperationCompleted,
    MessageKind::OperationCanceled,
];

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Host URL
    pub url: String,
    /// Collection window after PING
    pub ping_window: Duration,
    /// Collection window after TEST_OPERATION
    pub operation_window: Duration,
    /// Collection window after CANCEL_OPERATION
    pub cancel_window: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            ping_window: Duration::from_secs(2),
            operation_window: Duration::from_secs(5),
            cancel_window: Duration::from_secs(2),
        }
    }
}

impl ProbeConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

struct Link {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

/// Operation probe
///
/// Owns at most one connection. Every decoded inbound frame is kept in
/// arrival order, including frames collected before the peer went away.
pub struct OperationProbe {
    config: ProbeConfig,
    link: Option<Link>,
    received: Vec<Message>,
}

impl OperationProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            link: None,
            received: Vec::new(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .map(|link| link.sender.is_connected())
            .unwrap_or(false)
    }

    /// Messages received so far
    pub fn received(&self) -> &[Message] {
        &self.received
    }

    /// Open the connection
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {}", self.config.url);
        let (sender, receiver) = <WebSocketTransport as Transport>::connect(&self.config.url)
            .await
            .map_err(|e| ProbeError::ConnectionFailed(format!("{}: {}", self.config.url, e)))?;
        self.link = Some(Link { sender, receiver });
        info!("Connected to {}", self.config.url);
        Ok(())
    }

    /// Send a protocol message
    ///
    /// A no-op (logged) when not connected. A failed send drops the
    /// connection.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let text = codec::encode(message)?;
        debug!("Sending {:?}", message.tag());
        self.send_text(text).await
    }

    /// Send a raw text frame
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        let Some(link) = self.link.as_ref() else {
            warn!("Not connected, dropping outbound frame");
            return Ok(());
        };

        let result = link.sender.send_text(text).await;
        if let Err(e) = result {
            error!("Send failed: {}", e);
            self.link = None;
        }
        Ok(())
    }

    /// Receive until `window` elapses or the peer closes
    ///
    /// Returns the number of messages collected by this call.
    pub async fn collect(&mut self, window: Duration) -> usize {
        let deadline = Instant::now() + window;
        let before = self.received.len();

        while let Some(link) = self.link.as_mut() {
            let event = match timeout_at(deadline, link.receiver.recv()).await {
                Ok(event) => event,
                Err(_) => break,
            };

            match event {
                Some(TransportEvent::Frame(WireFrame::Text(text))) => {
                    let message = codec::decode(&text);
                    match message.tag() {
                        Some(tag) => info!("Received: {}", tag),
                        None => info!("Received raw text: {}", text),
                    }
                    self.received.push(message);
                }
                Some(TransportEvent::Frame(WireFrame::Binary(data))) => {
                    debug!("Ignoring {} byte binary frame", data.len());
                }
                Some(TransportEvent::Error(e)) => {
                    warn!("Transport error: {}", e);
                }
                Some(TransportEvent::Connected) => {}
                Some(TransportEvent::Disconnected { reason }) => {
                    info!("Host closed the connection: {:?}", reason);
                    self.link = None;
                }
                None => {
                    self.link = None;
                }
            }
        }

        self.received.len() - before
    }

    /// Tags of every structured message received
    pub fn observed_tags(&self) -> BTreeSet<String> {
        self.received
            .iter()
            .filter(|m| m.is_structured())
            .filter_map(|m| m.tag().map(str::to_string))
            .collect()
    }

    /// Expected kinds that have not been observed
    pub fn missing_tags(&self) -> Vec<MessageKind> {
        let observed = self.observed_tags();
        EXPECTED_TAGS
            .into_iter()
            .filter(|kind| !observed.contains(kind.as_str()))
            .collect()
    }

    /// Drive the full scenario
    ///
    /// Fails if the connection cannot be opened or a request cannot be
    /// encoded. The returned flag reports whether every expected kind was
    /// observed. The connection is closed on every path once opened.
    pub async fn run(&mut self) -> Result<bool> {
        self.connect().await?;
        let result = self.run_scenario().await;
        self.disconnect().await;
        result
    }

    async fn run_scenario(&mut self) -> Result<bool> {
        info!("Testing ping");
        self.send(&Message::ping(time::now())).await?;
        self.collect(self.config.ping_window).await;

        let operation_id = format!("test_{}", time::now_secs());
        info!("Testing operation {}", operation_id);
        self.send(&Message::test_operation(&operation_id, time::now()))
            .await?;
        self.collect(self.config.operation_window).await;

        info!("Testing cancel of {}", operation_id);
        self.send(&Message::cancel_operation(&operation_id, time::now()))
            .await?;
        self.collect(self.config.cancel_window).await;

        let missing = self.missing_tags();
        let passed = missing.is_empty();
        if passed {
            info!("All expected message types received");
        } else {
            let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            error!("Missing message types: {}", names.join(", "));
        }
        Ok(passed)
    }

    /// Close the connection; safe to call repeatedly
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.sender.close().await;
            info!("Disconnected from {}", self.config.url);
        }
    }
}
