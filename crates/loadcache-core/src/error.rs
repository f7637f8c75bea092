//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Transport error: {0}")]
    Transport(#[from] loadcache_transport::TransportError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request refused: {0}")]
    Refused(String),
}

/// Error recorded on a resource whose fetch or decode failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ResourceError {
    pub code: i32,
    pub message: String,
}

impl ResourceError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure of a kind-specific decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty font")]
    EmptyFont,

    #[error("Malformed WOFF data: {0}")]
    Woff(String),

    #[error("Decompression failed: {0}")]
    Compression(String),

    #[error("Image decode failed: {0}")]
    Image(String),
}

impl DecodeError {
    /// Code reported to clients for a decode failure
    pub const CODE: i32 = 100;
}
