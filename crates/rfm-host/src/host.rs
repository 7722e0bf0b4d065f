//! Main host implementation
//!
//! The host is transport-agnostic: it serves any `TransportServer`. Each
//! accepted connection gets its own task and its own operation registry, and
//! nothing is shared between connections.

use rfm_transport::{TransportError, TransportServer, WebSocketServer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::connection::Connection;
use crate::error::Result;

/// How `cancel_operation` interacts with an in-flight progress sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationMode {
    /// The sequence runs inline and always completes; a cancel is only answered
    #[default]
    Detached,
    /// The sequence runs as its own task and stops once its record is canceled
    Cooperative,
}

/// Host configuration
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Server name, used in logs
    pub name: String,
    /// Delay inserted before each progress frame
    pub progress_interval: Duration,
    /// Cancellation behavior
    pub cancellation: CancellationMode,
    /// Send a `connection_status` greeting on accept
    pub announce_connections: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "RFM Operation Host".to_string(),
            progress_interval: Duration::from_millis(500),
            cancellation: CancellationMode::Detached,
            announce_connections: false,
        }
    }
}

/// Operation host
pub struct OperationHost {
    config: Arc<HostConfig>,
    /// Flipped to true by `stop()`
    shutdown: watch::Sender<bool>,
}

impl OperationHost {
    pub fn new(config: HostConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            shutdown,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Serve using any TransportServer implementation.
    ///
    /// Returns once `stop()` is called or the listener goes away. Other accept
    /// errors are logged and do not end the loop.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        info!("{} accepting connections", self.config.name);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, addr)) => {
                        let connection = Connection::new(Arc::new(sender), addr, Arc::clone(&self.config));
                        tokio::spawn(connection.run(receiver));
                    }
                    Err(TransportError::ConnectionClosed) => {
                        error!("Listener closed, no longer accepting");
                        break;
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = shutdown.changed() => {}
            }
        }

        server.close().await?;
        info!("{} stopped", self.config.name);
        Ok(())
    }

    /// Start the host on WebSocket
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        self.serve_on(server).await
    }

    /// Stop accepting connections
    ///
    /// Connections that are already open keep running until their peer closes.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Default for OperationHost {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}
