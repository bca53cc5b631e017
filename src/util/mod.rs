//! # Utility Modules
//!
//! Common helpers used throughout the hart-rs crate: bit field manipulation,
//! hex encoding/decoding and frame logging.

pub mod bits;
pub mod hex;
pub mod logging;

pub use bits::{bit_mask, clear_mask, set_mask, test_bit, test_mask, BIT_FIELD_TABLE};
pub use hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex, HexError};
pub use logging::{log_frame_hex, log_frame_structured};
