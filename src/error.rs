//! # HART Error Handling
//!
//! This module defines the error types that can occur in the hart-rs crate:
//! codec errors raised while building or parsing a frame, errors reported by
//! the physical layer, and the crate-level `HartError`.

use thiserror::Error;

/// Errors raised by the frame codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The caller supplied a data field whose size does not match the command.
    #[error("Invalid payload length for command {command}: expected {expected}, got {actual}")]
    InvalidPayloadLength {
        command: u8,
        expected: usize,
        actual: usize,
    },

    /// The command has no known byte count.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// An address field value does not fit its bit width.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The received bytes do not form a valid frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The trailing check byte does not match the XOR of the frame.
    #[error("Checksum mismatch: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    ChecksumMismatch { expected: u8, calculated: u8 },
}

/// Errors reported by the physical layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhysError {
    #[error("Receive timeout")]
    Timeout,

    #[error("Parity error")]
    Parity,

    #[error("Framing error")]
    Framing,

    #[error("Receive overrun")]
    Overrun,

    #[error("Physical layer I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PhysError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => PhysError::Timeout,
            std::io::ErrorKind::InvalidData => PhysError::Framing,
            _ => PhysError::Io(error.to_string()),
        }
    }
}

/// Represents the different error types that can occur in the HART crate.
#[derive(Debug, Error)]
pub enum HartError {
    /// A transaction is already in flight on this master.
    #[error("Transaction already in progress")]
    Busy,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Physical layer error: {0}")]
    Phys(#[from] PhysError),

    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid hexadecimal string: {0}")]
    InvalidHexString(String),
}

impl From<serde_json::Error> for HartError {
    fn from(error: serde_json::Error) -> Self {
        HartError::Config(error.to_string())
    }
}

impl From<crate::util::hex::HexError> for HartError {
    fn from(error: crate::util::hex::HexError) -> Self {
        HartError::InvalidHexString(error.to_string())
    }
}
