//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for frame logging, the command line tool and test
//! fixtures.
//!
//! ## Usage
//!
//! ```rust
//! use hart_rs::util::hex::{encode_hex, decode_hex, pretty_hex};
//!
//! let data = [0x82, 0x00, 0x2B, 0xFF];
//! let hex_str = encode_hex(&data);
//! assert_eq!(hex_str, "82002bff");
//!
//! let decoded = decode_hex(&hex_str).unwrap();
//! assert_eq!(decoded, data);
//!
//! let pretty = pretty_hex(&data, 16);
//! println!("{}", pretty);
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to uppercase hex string
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace and an optional `0x` prefix are stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let trimmed = hex_str.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let cleaned: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    if let Some(bad) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HexError::InvalidCharacter(bad));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Parse a hex number of at most `max_bytes` bytes into a big-endian integer.
///
/// Used for device type codes and device identifiers given on the command
/// line, e.g. `0x2B` or `FFFFFF`.
pub fn parse_hex_u32(input: &str, max_bytes: usize) -> Result<u32, HexError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(HexError::EmptyString);
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HexError::InvalidCharacter(bad));
    }
    if digits.len() > max_bytes * 2 {
        return Err(HexError::DecodeError(format!(
            "{} does not fit in {} bytes",
            input, max_bytes
        )));
    }

    u32::from_str_radix(digits, 16).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Pretty-print hex data with offsets and an ASCII column
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    if data.is_empty() || bytes_per_line == 0 {
        return String::new();
    }

    data.chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = format_hex_compact(chunk);
            let pad = (bytes_per_line - chunk.len()) * 3;
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}: {hex}{:pad$} |{ascii}|", i * bytes_per_line, "")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "82 00 2b" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
