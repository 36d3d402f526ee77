//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with SMP messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Packet is too short to hold a header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Header length field disagrees with the body that follows it.
    #[error("length mismatch: header declares {declared} bytes, body has {actual}")]
    LengthMismatch {
        /// Length declared in the header.
        declared: usize,
        /// Actual body length.
        actual: usize,
    },

    /// Body is larger than the 16-bit length field allows.
    #[error("body too long: maximum {max} bytes, got {actual}")]
    BodyTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// Unknown op code in the header.
    #[error("unknown op code: {0}")]
    UnknownOp(u8),

    /// CBOR encoding failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// Body is not a CBOR map.
    #[error("body is not a CBOR map")]
    NotAMap,

    /// Required field missing from a response body.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field present but of the wrong type.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl ProtocolError {
    /// Create an invalid field error.
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Management return codes reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Success.
    Ok,
    /// Unknown error.
    Unknown,
    /// Insufficient memory.
    NoMemory,
    /// Error in input value.
    InValue,
    /// Operation timed out on the device.
    Timeout,
    /// No such file/entry.
    NoEntry,
    /// Current state disallows command.
    BadState,
    /// Response too large.
    TooLarge,
    /// Command not supported.
    NotSupported,
    /// Corrupt data.
    Corrupt,
    /// Device busy with another command.
    Busy,
    /// Access denied.
    AccessDenied,
    /// SMP version too old for the device.
    UnsupportedTooOld,
    /// SMP version too new for the device.
    UnsupportedTooNew,
    /// Group specific or unrecognised code.
    Other(i64),
}

impl ReturnCode {
    /// Whether this code reports success.
    pub fn is_ok(&self) -> bool {
        matches!(self, ReturnCode::Ok)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnCode::Ok => write!(f, "ok"),
            ReturnCode::Unknown => write!(f, "unknown error"),
            ReturnCode::NoMemory => write!(f, "insufficient memory"),
            ReturnCode::InValue => write!(f, "error in input value"),
            ReturnCode::Timeout => write!(f, "operation timed out"),
            ReturnCode::NoEntry => write!(f, "no such file/entry"),
            ReturnCode::BadState => write!(f, "current state disallows command"),
            ReturnCode::TooLarge => write!(f, "response too large"),
            ReturnCode::NotSupported => write!(f, "command not supported"),
            ReturnCode::Corrupt => write!(f, "corrupt data"),
            ReturnCode::Busy => write!(f, "device busy"),
            ReturnCode::AccessDenied => write!(f, "access denied"),
            ReturnCode::UnsupportedTooOld => write!(f, "SMP version too old"),
            ReturnCode::UnsupportedTooNew => write!(f, "SMP version too new"),
            ReturnCode::Other(code) => write!(f, "error code {}", code),
        }
    }
}

impl From<i64> for ReturnCode {
    fn from(code: i64) -> Self {
        use crate::constants::*;
        match code {
            MGMT_ERR_OK => ReturnCode::Ok,
            MGMT_ERR_UNKNOWN => ReturnCode::Unknown,
            MGMT_ERR_NO_MEMORY => ReturnCode::NoMemory,
            MGMT_ERR_IN_VALUE => ReturnCode::InValue,
            MGMT_ERR_TIMEOUT => ReturnCode::Timeout,
            MGMT_ERR_NO_ENTRY => ReturnCode::NoEntry,
            MGMT_ERR_BAD_STATE => ReturnCode::BadState,
            MGMT_ERR_TOO_LARGE => ReturnCode::TooLarge,
            MGMT_ERR_NOT_SUPPORTED => ReturnCode::NotSupported,
            MGMT_ERR_CORRUPT => ReturnCode::Corrupt,
            MGMT_ERR_BUSY => ReturnCode::Busy,
            MGMT_ERR_ACCESS_DENIED => ReturnCode::AccessDenied,
            MGMT_ERR_UNSUPPORTED_TOO_OLD => ReturnCode::UnsupportedTooOld,
            MGMT_ERR_UNSUPPORTED_TOO_NEW => ReturnCode::UnsupportedTooNew,
            _ => ReturnCode::Other(code),
        }
    }
}

impl From<ReturnCode> for i64 {
    fn from(code: ReturnCode) -> Self {
        use crate::constants::*;
        match code {
            ReturnCode::Ok => MGMT_ERR_OK,
            ReturnCode::Unknown => MGMT_ERR_UNKNOWN,
            ReturnCode::NoMemory => MGMT_ERR_NO_MEMORY,
            ReturnCode::InValue => MGMT_ERR_IN_VALUE,
            ReturnCode::Timeout => MGMT_ERR_TIMEOUT,
            ReturnCode::NoEntry => MGMT_ERR_NO_ENTRY,
            ReturnCode::BadState => MGMT_ERR_BAD_STATE,
            ReturnCode::TooLarge => MGMT_ERR_TOO_LARGE,
            ReturnCode::NotSupported => MGMT_ERR_NOT_SUPPORTED,
            ReturnCode::Corrupt => MGMT_ERR_CORRUPT,
            ReturnCode::Busy => MGMT_ERR_BUSY,
            ReturnCode::AccessDenied => MGMT_ERR_ACCESS_DENIED,
            ReturnCode::UnsupportedTooOld => MGMT_ERR_UNSUPPORTED_TOO_OLD,
            ReturnCode::UnsupportedTooNew => MGMT_ERR_UNSUPPORTED_TOO_NEW,
            ReturnCode::Other(code) => code,
        }
    }
}

/// A device-side error extracted from a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    /// Group that raised the error (SMP v2 only).
    pub group: Option<u16>,
    /// Return code.
    pub rc: ReturnCode,
}

impl DeviceError {
    /// Whether the device reported the command as not supported.
    pub fn is_not_supported(&self) -> bool {
        // v2 group errors reuse small numbers, only the generic code means "unsupported"
        self.group.is_none() && self.rc == ReturnCode::NotSupported
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group {
            Some(group) => write!(f, "group {} error: {}", group, i64::from(self.rc)),
            None => write!(f, "{}", self.rc),
        }
    }
}
