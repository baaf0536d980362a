//! Common error types for dropmedia.

use thiserror::Error;

/// Top-level error type for media storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials or client settings are missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote call (chunk upload, finalize, read, ...) failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The upstream content source reported a failure or broke its protocol.
    #[error("Source error: {0}")]
    Source(String),

    /// The remote store has no object at the requested path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is the store's explicit "not found" marker.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
