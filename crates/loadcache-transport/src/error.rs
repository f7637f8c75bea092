//! Transport error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not available in cache: {0}")]
    NotCached(String),

    #[error("Job cancelled")]
    Cancelled,
}

impl TransportError {
    /// Numeric code reported alongside the message when a job fails.
    ///
    /// The values are stable so consumers can switch on them without
    /// matching on the message text.
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Http(e) if e.is_timeout() => 3,
            TransportError::Http(e) if e.is_connect() => 2,
            TransportError::Http(_) => 1,
            TransportError::Io(_) => 4,
            TransportError::InvalidDataUrl(_) => 5,
            TransportError::UnsupportedScheme(_) => 6,
            TransportError::NotFound(_) => 7,
            TransportError::NotCached(_) => 8,
            TransportError::Cancelled => 9,
            TransportError::InvalidUrl(_) => 10,
        }
    }
}
