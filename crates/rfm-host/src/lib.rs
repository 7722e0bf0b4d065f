//! RFM Operation Host
//!
//! The host answers operation-progress requests on WebSocket connections:
//! - `ping` is answered with a `pong`
//! - `test_operation` runs a canned progress sequence
//! - `cancel_operation` is answered with `operation_canceled`
//! - anything else is echoed back unchanged
//!
//! Every connection is independent and processes its frames in arrival order.
//!
//! # Example
//!
//! ```no_run
//! use rfm_host::{HostConfig, OperationHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = OperationHost::new(HostConfig::default());
//!     host.serve_websocket("127.0.0.1:8765").await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod host;
pub mod registry;

pub use connection::{Connection, ConnectionId};
pub use error::{HostError, Result};
pub use host::{CancellationMode, HostConfig, OperationHost};
pub use registry::{OperationRecord, OperationRegistry, OperationState};
