//! Host error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("transport error: {0}")]
    Transport(#[from] rfm_transport::TransportError),

    #[error("core protocol error: {0}")]
    Core(#[from] rfm_core::Error),
}
