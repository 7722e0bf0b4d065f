//! RFM Core
//!
//! Message model and wire codec for the RFM operation-progress protocol.
//!
//! This crate provides:
//! - Protocol message types ([`Message`], [`MessageKind`])
//! - JSON text frame encoding/decoding ([`codec`])
//! - Timing utilities ([`Timestamp`])

pub mod codec;
pub mod error;
pub mod time;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use time::Timestamp;
pub use types::*;

/// Default host bind address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8765";

/// Default probe target
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8765";

/// Operation kind reported for simulated operations
pub const TEST_OPERATION_TYPE: &str = "test";

/// Display name reported for simulated operations
pub const TEST_OPERATION_NAME: &str = "Test Operation";

/// Progress values emitted for every simulated operation
pub const PROGRESS_STEPS: [u8; 5] = [0, 25, 50, 75, 100];

/// Status carried by every progress frame
pub const STATUS_RUNNING: &str = "running";
