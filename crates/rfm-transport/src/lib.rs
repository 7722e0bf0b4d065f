//! RFM Transport Layer
//!
//! WebSocket client and server plumbing for the operation-progress protocol.
//! Each connection is split into a sender (backed by a single writer task)
//! and a receiver yielding [`TransportEvent`]s in arrival order.

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer, WireFrame,
};
pub use websocket::{
    WebSocketConfig, WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport,
};
