//! Error types for the RFM protocol core

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// A payload serialized to something other than a JSON object
    #[error("payload for {0} is not a JSON object")]
    NotAnObject(&'static str),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::EncodeError(e.to_string())
    }
}
