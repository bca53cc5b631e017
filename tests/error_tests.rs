//! Unit tests for the error enums and their `Display` implementations.

use hart_rs::error::{FrameError, HartError, PhysError};
use hart_rs::{Address, FailureReason, MasterAddress, RetryCause};

/// Tests that the `InvalidPayloadLength` variant is correctly formatted.
#[test]
fn test_invalid_payload_length_error() {
    let err = FrameError::InvalidPayloadLength {
        command: 48,
        expected: 8,
        actual: 7,
    };
    assert_eq!(
        err.to_string(),
        "Invalid payload length for command 48: expected 8, got 7"
    );
}

/// Tests that the `ChecksumMismatch` variant is correctly formatted.
#[test]
fn test_checksum_mismatch_error() {
    let err = FrameError::ChecksumMismatch {
        expected: 0x6E,
        calculated: 0x4E,
    };
    assert_eq!(
        err.to_string(),
        "Checksum mismatch: expected 0x6E, calculated 0x4E"
    );
}

#[test]
fn test_busy_error() {
    assert_eq!(HartError::Busy.to_string(), "Transaction already in progress");
}

#[test]
fn test_frame_error_conversion() {
    let err: HartError = FrameError::UnsupportedCommand(0x03).into();
    assert_eq!(err.to_string(), "Frame error: Unsupported command: 3");
}

#[test]
fn test_io_error_mapping() {
    let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "no data");
    assert_eq!(PhysError::from(timed_out), PhysError::Timeout);

    let invalid = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad stop bit");
    assert_eq!(PhysError::from(invalid), PhysError::Framing);

    let other = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
    assert_eq!(PhysError::from(other), PhysError::Io("unplugged".to_string()));
}

#[test]
fn test_hex_error_conversion() {
    let err: HartError = hart_rs::util::hex::decode_hex("zz").unwrap_err().into();
    assert!(matches!(err, HartError::InvalidHexString(_)));
}

#[test]
fn test_failure_reason_display() {
    let expected = Address::new(MasterAddress::Secondary, false, 0x2B, 1).unwrap();
    let received = Address::new(MasterAddress::Secondary, false, 0x2B, 2).unwrap();
    let reason = FailureReason::RetriesExhausted {
        attempts: 3,
        last_cause: RetryCause::AddressMismatch { expected, received },
    };
    let text = reason.to_string();
    assert!(text.starts_with("no valid response after 3 attempts"));

    assert_eq!(
        FailureReason::Reset.to_string(),
        "transaction abandoned by reset"
    );
    assert_eq!(RetryCause::Timeout.to_string(), "no response within deadline");
}
