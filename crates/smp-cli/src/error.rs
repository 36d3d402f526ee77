//! Exit codes and the CLI error type.

use smp_client::SessionError;
use smp_transport::TransportError;
use thiserror::Error;

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    MissingRequiredArguments,
    UnknownArguments,
    InvalidTransport,
    InvalidGroup,
    InvalidCommand,
    NumericConversionFailed,
    NumericOutOfRange,
    InvalidArgumentValue,
    TransportOpenFailed,
    /// The device did not complete the command.
    CommandFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::MissingRequiredArguments => -1,
            ExitCode::UnknownArguments => -2,
            ExitCode::InvalidTransport => -3,
            ExitCode::InvalidGroup => -4,
            ExitCode::InvalidCommand => -5,
            ExitCode::NumericConversionFailed => -6,
            ExitCode::NumericOutOfRange => -7,
            ExitCode::InvalidArgumentValue => -8,
            ExitCode::TransportOpenFailed => -9,
            ExitCode::CommandFailed => -10,
        }
    }
}

/// An invocation that ended without success, with the text shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CliError {
    pub code: ExitCode,
    pub message: String,
}

impl CliError {
    pub fn new(code: ExitCode, message: impl Into<String>) -> Self {
        CliError {
            code,
            message: message.into(),
        }
    }

    pub fn missing(option: &str) -> Self {
        CliError::new(
            ExitCode::MissingRequiredArguments,
            format!("Missing required argument: --{option}"),
        )
    }

    pub fn invalid_value(option: &str, value: &str) -> Self {
        CliError::new(
            ExitCode::InvalidArgumentValue,
            format!("Error: invalid value for --{option}: {value}"),
        )
    }

    pub fn not_numeric(option: &str, value: &str) -> Self {
        CliError::new(
            ExitCode::NumericConversionFailed,
            format!("Error: --{option} must be numeric: {value}"),
        )
    }

    pub fn out_of_range(option: &str, value: impl std::fmt::Display) -> Self {
        CliError::new(
            ExitCode::NumericOutOfRange,
            format!("Error: --{option} out of range: {value}"),
        )
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        CliError::new(
            ExitCode::TransportOpenFailed,
            format!("Transport open failed: {err}"),
        )
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Transport(err) => err.into(),
            other => CliError::new(ExitCode::CommandFailed, format!("Error: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
