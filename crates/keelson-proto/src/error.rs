/// keelson error types.
///
/// Every failure that can cross the wire has a stable numeric code so that a
/// rejection produced by a remote engine is surfaced to the caller as the same
/// variant it was raised with.

use serde::{Deserialize, Serialize};

/// Unified error type for all keelson protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum KsError {
    #[error("unknown error")]
    Unknown,
    #[error("I/O error")]
    Eio,
    #[error("invalid parameters")]
    InvalidParms,
    #[error("system error")]
    SystemError,
    #[error("network error")]
    NetworkError,
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,

    // Message buffer errors
    #[error("message used before init")]
    MessageNotInitialized,
    #[error("message exceeds maximum size")]
    MessageTooLarge,
    #[error("failed to encode message")]
    Encode,
    #[error("failed to decode message")]
    Decode,
    #[error("unexpected response")]
    UnexpectedResponse,

    // Membership errors (raised by the leader's engine)
    #[error("no available leader")]
    NoLeader,
    #[error("server is not the leader")]
    NotLeader,
    #[error("a server with this ID already exists")]
    DuplicateId,
    #[error("no server with this ID")]
    NotFound,

    // Engine errors
    #[error("engine already stopped")]
    Stopped,
    #[error("no such database")]
    NoDatabase,
    #[error("SQLite threading mode could not be changed")]
    ThreadingMode,
}

impl KsError {
    /// Convert from a raw protocol error code to KsError.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0x00 => None, // Success
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::Eio),
            0x03 => Some(Self::InvalidParms),
            0x04 => Some(Self::SystemError),
            0x05 => Some(Self::NetworkError),
            0x06 => Some(Self::Timeout),
            0x07 => Some(Self::Cancelled),
            0x10 => Some(Self::MessageNotInitialized),
            0x11 => Some(Self::MessageTooLarge),
            0x12 => Some(Self::Encode),
            0x13 => Some(Self::Decode),
            0x14 => Some(Self::UnexpectedResponse),
            0x20 => Some(Self::NoLeader),
            0x21 => Some(Self::NotLeader),
            0x22 => Some(Self::DuplicateId),
            0x23 => Some(Self::NotFound),
            0x30 => Some(Self::Stopped),
            0x31 => Some(Self::NoDatabase),
            0x32 => Some(Self::ThreadingMode),
            _ => Some(Self::Unknown),
        }
    }

    /// Convert to raw protocol error code.
    pub fn to_code(self) -> u32 {
        match self {
            Self::Unknown => 0x01,
            Self::Eio => 0x02,
            Self::InvalidParms => 0x03,
            Self::SystemError => 0x04,
            Self::NetworkError => 0x05,
            Self::Timeout => 0x06,
            Self::Cancelled => 0x07,
            Self::MessageNotInitialized => 0x10,
            Self::MessageTooLarge => 0x11,
            Self::Encode => 0x12,
            Self::Decode => 0x13,
            Self::UnexpectedResponse => 0x14,
            Self::NoLeader => 0x20,
            Self::NotLeader => 0x21,
            Self::DuplicateId => 0x22,
            Self::NotFound => 0x23,
            Self::Stopped => 0x30,
            Self::NoDatabase => 0x31,
            Self::ThreadingMode => 0x32,
        }
    }
}

/// Result type alias for keelson operations.
pub type KsResult<T> = Result<T, KsError>;

impl From<std::io::Error> for KsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => KsError::Timeout,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => KsError::NetworkError,
            _ => KsError::Eio,
        }
    }
}
