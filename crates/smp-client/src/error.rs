//! Client error types.

use smp_transport::TransportError;
use thiserror::Error;

/// Errors returned by the request processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// A request is already outstanding.
    #[error("a request is already in progress")]
    Busy,

    /// The transport refused the request.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors that end a session run without a device status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The transport is not connected.
    #[error("transport not connected")]
    NotConnected,

    /// Another command is still running.
    #[error("a command is already running")]
    Busy,

    /// The command could not be dispatched.
    #[error("failed to start command: {0}")]
    StartFailed(String),

    /// The transport closed while the command was running.
    #[error("transport disconnected")]
    Disconnected,

    /// Connecting or disconnecting failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
