//! HART Protocol Constants
//!
//! This module defines constants used by the HART data-link layer
//! implementation: delimiter bit masks, frame layout, Command 48 layout and
//! the FSK timing parameters.

// ----------------------------------------------------------------------------
// Delimiter
// ----------------------------------------------------------------------------

/// Delimiter bit selecting the 5-byte unique address format
pub const DELIMITER_UNIQUE_ADDRESS: u8 = 0x80;

/// Delimiter bits carrying the number of expansion bytes
pub const DELIMITER_EXPANSION_MASK: u8 = 0x60;

/// Delimiter bits carrying the physical layer type (0 = asynchronous FSK)
pub const DELIMITER_PHYSICAL_LAYER_MASK: u8 = 0x18;

/// Delimiter bits carrying the frame type
pub const DELIMITER_FRAME_TYPE_MASK: u8 = 0x07;

/// Burst frame (field device, unsolicited)
pub const FRAME_TYPE_BACK: u8 = 0x01;

/// Master to field device
pub const FRAME_TYPE_STX: u8 = 0x02;

/// Field device to master
pub const FRAME_TYPE_ACK: u8 = 0x06;

// ----------------------------------------------------------------------------
// Address
// ----------------------------------------------------------------------------

/// First address byte: primary master bit
pub const ADDRESS_MASTER_MASK: u8 = 0x80;

/// First address byte: burst mode bit
pub const ADDRESS_BURST_MASK: u8 = 0x40;

/// Largest device type code (14 bits)
pub const MAX_DEVICE_TYPE: u16 = 0x3FFF;

/// Largest device identifier (24 bits)
pub const MAX_DEVICE_ID: u32 = 0x00FF_FFFF;

/// Length of the unique address field
pub const UNIQUE_ADDRESS_LEN: usize = 5;

// ----------------------------------------------------------------------------
// Frame layout
// ----------------------------------------------------------------------------

/// Delimiter + address + command + byte count
pub const FRAME_HEADER_LEN: usize = 1 + UNIQUE_ADDRESS_LEN + 1 + 1;

/// Smallest possible frame: header + checksum, no data
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN + 1;

/// Preamble byte sent ahead of every frame
pub const PREAMBLE_BYTE: u8 = 0xFF;

/// Default number of preamble bytes
pub const DEFAULT_PREAMBLE_LEN: u8 = 5;

/// Maximum preamble length a field device may use
pub const MAX_PREAMBLE_LEN: usize = 20;

/// Consecutive preamble bytes a receiver needs before it accepts a delimiter
pub const MIN_PREAMBLE_LEN: usize = 2;

// ----------------------------------------------------------------------------
// Command 48 (Read Additional Device Status)
// ----------------------------------------------------------------------------

pub const COMMAND_48: u8 = 0x30;

/// Byte count of the Command 48 data field
pub const COMMAND_48_BYTE_COUNT: usize = 8;

/// Full Command 48 frame length with unique addressing
pub const COMMAND_48_FRAME_LEN: usize = MIN_FRAME_LEN + COMMAND_48_BYTE_COUNT;

// ----------------------------------------------------------------------------
// Timing (FSK, 1200 baud, 11 bits per character)
// ----------------------------------------------------------------------------

pub const FSK_BAUDRATE: u32 = 1200;

/// Character time in microseconds
pub const CHARACTER_TIME_US: u64 = 9_167;

/// Response window for a secondary master, in character times
pub const RT1_CHARS: u32 = 41;

/// Inter-character bound, in character times
pub const RT2_CHARS: u32 = 8;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u8 = 2;

// ----------------------------------------------------------------------------
// Default field device (Honeywell STT700)
// ----------------------------------------------------------------------------

/// Manufacturer device type code
pub const DEFAULT_DEVICE_TYPE: u16 = 0x002B;

/// Device identifier
pub const DEFAULT_DEVICE_ID: u32 = 0x00FF_FFFF;
