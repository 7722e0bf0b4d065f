//! Probe error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] rfm_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] rfm_transport::TransportError),
}
