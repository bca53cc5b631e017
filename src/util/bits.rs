//! # Bit Field Utilities
//!
//! Pure helpers for setting and testing bits in a single byte. They are used
//! by the frame codec (delimiter and address bits) and by the diagnostic
//! decoder (Command 48 status bits).
//!
//! ## Usage
//!
//! ```rust
//! use hart_rs::util::bits::{bit_mask, set_mask, test_mask};
//!
//! let byte = set_mask(0x00, bit_mask(7).unwrap());
//! assert_eq!(byte, 0x80);
//! assert!(test_mask(byte, 0x80));
//! ```

/// Single-bit masks indexed by bit position, LSB (bit 0) to MSB (bit 7).
pub const BIT_FIELD_TABLE: [u8; 8] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];

/// Mask for a bit position, `None` if the position is outside the byte.
#[inline]
pub fn bit_mask(position: u8) -> Option<u8> {
    BIT_FIELD_TABLE.get(position as usize).copied()
}

/// Set every bit of `mask` in `byte`.
#[inline]
pub const fn set_mask(byte: u8, mask: u8) -> u8 {
    byte | mask
}

/// Clear every bit of `mask` in `byte`.
#[inline]
pub const fn clear_mask(byte: u8, mask: u8) -> u8 {
    byte & !mask
}

/// Set or clear the bits of `mask` depending on `on`.
#[inline]
pub const fn assign_mask(byte: u8, mask: u8, on: bool) -> u8 {
    if on {
        set_mask(byte, mask)
    } else {
        clear_mask(byte, mask)
    }
}

/// True if any bit of `mask` is set in `byte`.
#[inline]
pub const fn test_mask(byte: u8, mask: u8) -> bool {
    byte & mask != 0
}

/// True only if every bit of `mask` is set in `byte`.
#[inline]
pub const fn test_mask_all(byte: u8, mask: u8) -> bool {
    byte & mask == mask
}

/// Test a single bit by position. Positions past bit 7 are never set.
#[inline]
pub fn test_bit(byte: u8, position: u8) -> bool {
    bit_mask(position).is_some_and(|mask| test_mask(byte, mask))
}

/// Set a single bit by position. Positions past bit 7 leave the byte unchanged.
#[inline]
pub fn set_bit(byte: u8, position: u8) -> u8 {
    bit_mask(position).map_or(byte, |mask| set_mask(byte, mask))
}

/// Extract the field selected by a contiguous `mask`, shifted down to bit 0.
#[inline]
pub const fn field(byte: u8, mask: u8) -> u8 {
    if mask == 0 {
        return 0;
    }
    (byte & mask) >> mask.trailing_zeros()
}

/// Positions of all bits set in `byte`, lowest first.
pub fn set_positions(byte: u8) -> Vec<u8> {
    (0u8..8).filter(|&position| test_bit(byte, position)).collect()
}
