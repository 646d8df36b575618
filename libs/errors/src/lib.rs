//! Unified error handling for the process-data driver layer
//!
//! Every fallible operation in the core returns [`DriverResult`]. Errors are
//! grouped into four families:
//!
//! - [`AddressError`]: the caller passed an address the backend cannot serve
//! - [`ProtocolError`]: the shared-memory handshake or a command payload is malformed
//! - [`TransportError`]: locks, links and timeouts failed underneath the caller
//! - `NotInitialized`: a backend or handle was used without being constructed

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// AddressError
// ============================================================================

/// Address validation failures, always raised before shared state is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Bit offset out of range: {bit} (valid 0..=7)")]
    BitOutOfRange { bit: u32 },

    #[error("Byte offset out of range: {byte} + {width} bytes exceeds {max}")]
    ByteOutOfRange { byte: u32, width: u32, max: u32 },

    #[error("Area out of range: {area}")]
    AreaOutOfRange { area: String },

    #[error("Area not allowed by this backend: {area}")]
    AreaNotAllowed { area: String },

    #[error("Write to input area not allowed: byte {byte}")]
    WriteToInputNotAllowed { byte: u32 },

    #[error("Invalid address notation: {0}")]
    InvalidNotation(String),
}

// ============================================================================
// ProtocolError
// ============================================================================

/// Shared-memory handshake and command payload failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Mailbox not ready: request_pending={request_pending}, reply_pending={reply_pending}")]
    NotReady {
        request_pending: bool,
        reply_pending: bool,
    },

    #[error("Out of sequence reply: request_pending={request_pending}, reply_pending={reply_pending}")]
    OutOfSequence {
        request_pending: bool,
        reply_pending: bool,
    },

    #[error("Command mismatch: expected {expected}, got {actual}")]
    CommandMismatch { expected: i32, actual: i32 },

    #[error("Payload length mismatch for command {command}: expected {expected}, got {actual}")]
    LengthMismatch {
        command: i32,
        expected: String,
        actual: i32,
    },

    #[error("Unknown command id: {0}")]
    UnknownCommand(i32),

    #[error("Unknown area code: {0}")]
    UnknownArea(i32),

    #[error("Payload too large: {len} values (capacity {capacity})")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("Command {command} failed on the server (reply code {code})")]
    CommandFailed { command: i32, code: i32 },

    #[error("Unexpected reply code {code} for command {command}")]
    UnexpectedReply { command: i32, code: i32 },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

// ============================================================================
// TransportError
// ============================================================================

/// Backend-level failures: locks, segments, device links, timeouts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Timed out after {0:?} waiting for reply")]
    ReplyTimeout(Duration),

    #[error("Timed out after {0:?} waiting for lock")]
    LockTimeout(Duration),

    #[error("Shared segment error: {0}")]
    Segment(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Link timeout: {0}")]
    LinkTimeout(String),

    #[error("Modbus exception: function {function:#04X}, code {code:#04X}")]
    Exception { function: u8, code: u8 },
}

// ============================================================================
// DriverError - Main error type
// ============================================================================

/// Main error type for all driver-layer crates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using DriverError
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn segment(msg: impl Into<String>) -> Self {
        Self::Transport(TransportError::Segment(msg.into()))
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Transport(TransportError::Connection(msg.into()))
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Transport(TransportError::Io(msg.into()))
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MalformedFrame(msg.into()))
    }

    /// Address and protocol errors are fixed by the caller; the backend itself is healthy
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Address(_) | Self::Protocol(_))
    }

    /// Check if this error indicates the device link must be re-established
    pub fn needs_reconnect(&self) -> bool {
        match self {
            Self::Transport(TransportError::Io(_))
            | Self::Transport(TransportError::Connection(_))
            | Self::Transport(TransportError::NotConnected)
            | Self::Transport(TransportError::LinkTimeout(_)) => true,
            Self::Protocol(ProtocolError::MalformedFrame(_)) => true,
            _ => false,
        }
    }

    /// Stable machine-readable code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Address(e) => match e {
                AddressError::BitOutOfRange { .. } => "BIT_OUT_OF_RANGE",
                AddressError::ByteOutOfRange { .. } => "BYTE_OUT_OF_RANGE",
                AddressError::AreaOutOfRange { .. } => "AREA_OUT_OF_RANGE",
                AddressError::AreaNotAllowed { .. } => "AREA_NOT_ALLOWED",
                AddressError::WriteToInputNotAllowed { .. } => "WRITE_TO_INPUT_NOT_ALLOWED",
                AddressError::InvalidNotation(_) => "INVALID_ADDRESS",
            },
            Self::Protocol(e) => match e {
                ProtocolError::NotReady { .. } => "NOT_READY",
                ProtocolError::OutOfSequence { .. } => "OUT_OF_SEQUENCE",
                ProtocolError::CommandMismatch { .. } => "COMMAND_MISMATCH",
                ProtocolError::LengthMismatch { .. } => "LENGTH_MISMATCH",
                ProtocolError::UnknownCommand(_) => "UNKNOWN_COMMAND",
                ProtocolError::UnknownArea(_) => "UNKNOWN_AREA",
                ProtocolError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
                ProtocolError::CommandFailed { .. } => "COMMAND_FAILED",
                ProtocolError::UnexpectedReply { .. } => "UNEXPECTED_REPLY",
                ProtocolError::MalformedFrame(_) => "MALFORMED_FRAME",
            },
            Self::Transport(e) => match e {
                TransportError::ReplyTimeout(_) => "REPLY_TIMEOUT",
                TransportError::LockTimeout(_) => "LOCK_TIMEOUT",
                TransportError::Segment(_) => "SEGMENT_ERROR",
                TransportError::Connection(_) => "CONNECTION_ERROR",
                TransportError::NotConnected => "NOT_CONNECTED",
                TransportError::Io(_) => "IO_ERROR",
                TransportError::LinkTimeout(_) => "LINK_TIMEOUT",
                TransportError::Exception { .. } => "MODBUS_EXCEPTION",
            },
            Self::NotInitialized(_) => "NOT_INITIALIZED",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }
}

// Conversion traits for common error types
impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Transport(TransportError::LinkTimeout(err.to_string()))
            },
            _ => Self::Transport(TransportError::Io(err.to_string())),
        }
    }
}

impl From<figment::Error> for DriverError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
