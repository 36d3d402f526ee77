//! Transport error types.

use thiserror::Error;

/// Errors returned by transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connect called on an open transport, or configuration changed while open.
    #[error("transport already connected")]
    AlreadyConnected,

    /// Operation needs an open transport.
    #[error("transport not connected")]
    NotConnected,

    /// Configuration missing or out of range.
    #[error("invalid transport configuration: {0}")]
    InvalidConfiguration(String),

    /// The underlying port or socket could not be opened.
    #[error("failed to open transport: {0}")]
    OpenFailed(String),

    /// This transport cannot be used in this build.
    #[error("transport not supported: {0}")]
    Unsupported(String),

    /// I/O error on an open transport.
    #[error("transport I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
