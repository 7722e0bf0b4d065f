//! RFM Operation Probe
//!
//! Test client that drives the fixed ping / operation / cancel scenario
//! against an operation host and checks which message kinds came back.
//!
//! # Example
//!
//! ```no_run
//! use rfm_probe::{OperationProbe, ProbeConfig};
//!
//! #[tokio::main]
//! async fn main() -> rfm_probe::Result<()> {
//!     let mut probe = OperationProbe::new(ProbeConfig::default());
//!     let passed = probe.run().await?;
//!     println!("probe passed: {}", passed);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod probe;

pub use error::{ProbeError, Result};
pub use probe::{OperationProbe, ProbeConfig, EXPECTED_TAGS};
