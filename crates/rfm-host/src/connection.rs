//! Per-connection frame handling

use rfm_core::{codec, progress_steps, time, Message};
use rfm_transport::{TransportEvent, TransportReceiver, TransportSender, WireFrame};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::host::{CancellationMode, HostConfig};
use crate::registry::{OperationRecord, OperationRegistry};

/// Connection identifier
pub type ConnectionId = String;

/// How a progress sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Canceled,
}

/// A connected client
pub struct Connection {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Peer address
    pub addr: SocketAddr,
    sender: Arc<dyn TransportSender>,
    config: Arc<HostConfig>,
    operations: Arc<OperationRegistry>,
}

impl Connection {
    pub fn new(sender: Arc<dyn TransportSender>, addr: SocketAddr, config: Arc<HostConfig>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            addr,
            sender,
            config,
            operations: Arc::new(OperationRegistry::new()),
        }
    }

    /// Serve this connection until the peer goes away
    pub async fn run<R>(self, mut receiver: R)
    where
        R: TransportReceiver + 'static,
    {
        info!("Client connected: {} ({})", self.addr, self.id);

        if self.config.announce_connections {
            if let Err(e) = self.send_greeting().await {
                debug!("Greeting to {} failed: {}", self.addr, e);
            }
        }

        while let Some(event) = receiver.recv().await {
            match event {
                TransportEvent::Frame(frame) => {
                    if let Err(e) = self.handle_frame(frame).await {
                        debug!("Send to {} failed: {}", self.addr, e);
                        break;
                    }
                }
                TransportEvent::Disconnected { reason } => {
                    info!("Client {} disconnected: {:?}", self.addr, reason);
                    break;
                }
                TransportEvent::Error(e) => {
                    warn!("Transport error from {}: {}", self.addr, e);
                }
                TransportEvent::Connected => {}
            }
        }

        let abandoned = self.operations.cancel_all();
        if abandoned > 0 {
            debug!("Abandoned {} in-flight operations for {}", abandoned, self.addr);
        }
    }

    /// Answer a single inbound frame
    pub async fn handle_frame(&self, frame: WireFrame) -> Result<()> {
        let text = match frame {
            WireFrame::Text(text) => text,
            WireFrame::Binary(data) => {
                debug!("Echoing {} byte binary frame to {}", data.len(), self.addr);
                self.sender.send(WireFrame::Binary(data)).await?;
                return Ok(());
            }
        };

        let message = codec::decode(&text);
        debug!("Received from {}: {:?}", self.addr, message.tag());

        match message {
            Message::Ping(ping) => {
                self.send_message(&Message::pong(time::now(), ping.timestamp))
                    .await
            }
            Message::TestOperation(request) => self.start_operation(&request.operation_id).await,
            Message::CancelOperation(request) => {
                self.cancel_operation(request.operation_id.as_deref()).await
            }
            Message::Opaque(opaque) => {
                if !opaque.structured {
                    warn!("Invalid JSON received from {}, echoing", self.addr);
                }
                self.echo(text).await
            }
            Message::Pong(_)
            | Message::OperationStarted(_)
            | Message::ProgressUpdate(_)
            | Message::OperationCompleted(_)
            | Message::OperationCanceled(_) => self.echo(text).await,
        }
    }

    async fn echo(&self, text: String) -> Result<()> {
        self.sender.send_text(text).await?;
        Ok(())
    }

    async fn send_message(&self, message: &Message) -> Result<()> {
        send_message(self.sender.as_ref(), message).await
    }

    async fn send_greeting(&self) -> Result<()> {
        let greeting = json!({
            "type": "connection_status",
            "status": "connected",
            "connection_id": self.id,
            "timestamp": time::now(),
        });
        self.sender.send_text(greeting.to_string()).await?;
        Ok(())
    }

    async fn start_operation(&self, operation_id: &str) -> Result<()> {
        let record = self.operations.register(operation_id);
        info!("Operation started: {} ({})", operation_id, self.addr);

        match self.config.cancellation {
            CancellationMode::Detached => {
                run_sequence(
                    self.sender.as_ref(),
                    &record,
                    self.config.progress_interval,
                    CancellationMode::Detached,
                )
                .await?;
                info!("Operation completed: {}", operation_id);
                Ok(())
            }
            CancellationMode::Cooperative => {
                let sender = Arc::clone(&self.sender);
                let interval = self.config.progress_interval;
                let addr = self.addr;
                tokio::spawn(async move {
                    match run_sequence(sender.as_ref(), &record, interval, CancellationMode::Cooperative)
                        .await
                    {
                        Ok(Outcome::Completed) => info!("Operation completed: {}", record.id),
                        Ok(Outcome::Canceled) => info!("Operation stopped after cancel: {}", record.id),
                        Err(e) => debug!("Operation {} for {} abandoned: {}", record.id, addr, e),
                    }
                });
                Ok(())
            }
        }
    }

    async fn cancel_operation(&self, operation_id: Option<&str>) -> Result<()> {
        let canceled = operation_id
            .map(|id| self.operations.cancel(id))
            .unwrap_or(0);
        info!(
            "Operation canceled: {:?} ({} in flight)",
            operation_id, canceled
        );

        self.send_message(&Message::operation_canceled(operation_id, time::now()))
            .await
    }
}

async fn send_message(sender: &dyn TransportSender, message: &Message) -> Result<()> {
    let text = codec::encode(message)?;
    sender.send_text(text).await?;
    Ok(())
}

/// Emit the canned sequence for one operation
///
/// `operation_started`, then one `progress_update` per step with `interval`
/// slept before each, then `operation_completed`. In cooperative mode the
/// record is checked before every frame.
async fn run_sequence(
    sender: &dyn TransportSender,
    record: &OperationRecord,
    interval: Duration,
    mode: CancellationMode,
) -> Result<Outcome> {
    let stop_requested = || mode == CancellationMode::Cooperative && record.is_canceled();

    record.start();
    if stop_requested() {
        return Ok(Outcome::Canceled);
    }
    send_message(sender, &Message::operation_started(&record.id)).await?;

    for progress in progress_steps() {
        tokio::time::sleep(interval).await;
        if stop_requested() {
            return Ok(Outcome::Canceled);
        }
        send_message(
            sender,
            &Message::progress_update(&record.id, progress, time::now()),
        )
        .await?;
    }

    if stop_requested() {
        return Ok(Outcome::Canceled);
    }
    send_message(sender, &Message::operation_completed(&record.id, time::now())).await?;
    record.complete();

    Ok(Outcome::Completed)
}
