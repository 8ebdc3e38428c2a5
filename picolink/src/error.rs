//! Error types for picolink.

use std::io;
use thiserror::Error;

/// Result type for picolink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a session could not be opened.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The selector did not resolve to any serial port.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// This session already holds an open handle.
    #[error("Session is already open on {0}")]
    AlreadyOpen(String),

    /// The OS refused to open the port (permissions, port busy, ...).
    #[error("OS rejected opening {port}: {reason}")]
    OsRejected {
        /// Port system name.
        port: String,
        /// OS-provided description of the failure.
        reason: String,
    },
}

/// Reasons a payload could not be sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The session has no open handle.
    #[error("Serial session is not connected")]
    NotConnected,

    /// The OS accepted fewer bytes than requested.
    #[error("Short write: {written} of {expected} bytes accepted")]
    ShortWrite {
        /// Number of bytes the OS accepted.
        written: usize,
        /// Payload length.
        expected: usize,
    },

    /// The handle failed; the session has been closed.
    #[error("Serial I/O error: {detail}")]
    Io {
        /// OS-provided description of the failure.
        detail: String,
    },
}

/// Error type for picolink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Opening a session failed.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// Sending a payload failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Invalid command payload.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}
