//! WebSocket transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async, connect_async, tungstenite::protocol::Message as WsMessage, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer, WireFrame,
};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Capacity of the outbound and inbound channels of each connection
    pub channel_capacity: usize,
    /// How long an accepted TCP peer has to complete the upgrade
    pub handshake_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket transport
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            config: WebSocketConfig::default(),
        }
    }

    /// Connect using this transport's configuration
    pub async fn open(&self, url: &str) -> Result<(WebSocketSender, WebSocketReceiver)> {
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_connection(ws_stream, &self.config))
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket sender
#[derive(Clone)]
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, frame: WireFrame) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let msg = match frame {
            WireFrame::Text(text) => WsMessage::Text(text),
            WireFrame::Binary(data) => WsMessage::Binary(data.to_vec()),
        };

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let was_connected = std::mem::replace(&mut *self.connected.lock(), false);
        if was_connected {
            let _ = self.tx.send(WsMessage::Close(None)).await;
        }
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        WebSocketTransport::new().open(url).await
    }
}

/// Split a WebSocket stream into a sender/receiver pair backed by two tasks
///
/// The writer task owns the sink, so every frame goes out whole and in the
/// order it was queued. The reader task forwards frames as events until the
/// peer closes or the stream fails.
fn spawn_connection<S>(
    ws_stream: WebSocketStream<S>,
    config: &WebSocketConfig,
) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(config.channel_capacity);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(config.channel_capacity);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                debug!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    let _ = event_tx
                        .send(TransportEvent::Frame(WireFrame::Text(text)))
                        .await;
                }
                Ok(WsMessage::Binary(data)) => {
                    let _ = event_tx
                        .send(TransportEvent::Frame(WireFrame::Binary(Bytes::from(data))))
                        .await;
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                    // Control frames are answered by tungstenite
                }
                Ok(WsMessage::Close(frame)) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    debug!("WebSocket closed by peer: {:?}", reason);
                    let _ = event_tx
                        .send(TransportEvent::Disconnected { reason })
                        .await;
                    break;
                }
                Ok(WsMessage::Frame(_)) => {}
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    let sender = WebSocketSender {
        tx: send_tx,
        connected,
    };

    let receiver = WebSocketReceiver { rx: event_rx };

    (sender, receiver)
}

type Established = (WebSocketSender, WebSocketReceiver, SocketAddr);

/// WebSocket server
///
/// A background task owns the listener. Every TCP connection is upgraded on
/// its own task under `handshake_timeout`, so a peer that never completes the
/// upgrade cannot delay anyone else's `accept`.
pub struct WebSocketServer {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<Established>,
    acceptor: JoinHandle<()>,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, WebSocketConfig::default()).await
    }

    pub async fn bind_with_config(addr: &str, config: WebSocketConfig) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on {}", local_addr);

        let (incoming_tx, incoming) = mpsc::channel(config.channel_capacity);
        let acceptor = tokio::spawn(accept_loop(listener, config, incoming_tx));

        Ok(Self {
            local_addr,
            incoming,
            acceptor,
        })
    }
}

async fn accept_loop(
    listener: tokio::net::TcpListener,
    config: WebSocketConfig,
    incoming: mpsc::Sender<Established>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = incoming.closed() => break,
        };

        let (stream, addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("TCP accept error: {}", e);
                continue;
            }
        };

        debug!("Accepted TCP connection from {}", addr);

        let config = config.clone();
        let incoming = incoming.clone();
        tokio::spawn(async move {
            match timeout(config.handshake_timeout, accept_async(stream)).await {
                Ok(Ok(ws_stream)) => {
                    info!("WebSocket client connected from {}", addr);
                    let (sender, receiver) = spawn_connection(ws_stream, &config);
                    let _ = incoming.send((sender, receiver, addr)).await;
                }
                Ok(Err(e)) => {
                    debug!("WebSocket handshake with {} failed: {}", addr, e);
                }
                Err(_) => {
                    warn!(
                        "WebSocket handshake with {} timed out after {:?}",
                        addr, config.handshake_timeout
                    );
                }
            }
        });
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        self.incoming
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> Result<()> {
        self.acceptor.abort();
        Ok(())
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}
