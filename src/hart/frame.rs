//! # HART Frame Codec
//!
//! This module encodes and decodes HART Protocol Data Units as they travel
//! over the asynchronous FSK channel. Header parsing uses `nom`, and frames
//! are held in immutable `bytes::Bytes` buffers so a retry can resend the
//! same frame without copying it.
//!
//! ## Wire format
//!
//! ```text
//! +-----------+-------------+---------+------------+------------------+----------+
//! | delimiter | address (5) | command | byte count | data (byte count) | checksum |
//! +-----------+-------------+---------+------------+------------------+----------+
//! ```
//!
//! The checksum is the XOR of every preceding byte, so XOR-folding a whole
//! valid frame gives `0x00`. Preamble bytes (`0xFF`) sent ahead of the
//! delimiter are a physical concern and never part of a `Frame`.
//!
//! ## Usage
//!
//! ```rust
//! use hart_rs::hart::frame::{checksum, decode, encode, Address, MasterAddress};
//!
//! let address = Address::new(MasterAddress::Secondary, false, 0x002B, 0xFF_FFFF).unwrap();
//! let frame = encode(&address, 0x30, &[0u8; 8]).unwrap();
//! assert_eq!(frame.as_bytes()[0], 0x82);
//! assert_eq!(frame.len(), 17);
//! assert_eq!(checksum(frame.as_bytes()), 0x00);
//!
//! let response = decode(frame.as_bytes()).unwrap();
//! assert_eq!(response.address(), &address);
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::constants::{
    ADDRESS_BURST_MASK, ADDRESS_MASTER_MASK, COMMAND_48, COMMAND_48_BYTE_COUNT,
    DELIMITER_EXPANSION_MASK, DELIMITER_FRAME_TYPE_MASK, DELIMITER_PHYSICAL_LAYER_MASK,
    DELIMITER_UNIQUE_ADDRESS, FRAME_HEADER_LEN, FRAME_TYPE_ACK, FRAME_TYPE_BACK,
    FRAME_TYPE_STX, MAX_DEVICE_ID, MAX_DEVICE_TYPE, MIN_FRAME_LEN, UNIQUE_ADDRESS_LEN,
};
use crate::error::FrameError;
use crate::hart::diagnostics::Command48Response;
use crate::util::bits::{assign_mask, field, set_mask, test_mask};

/// Which master a frame is addressed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterAddress {
    Primary,
    Secondary,
}

/// A 5-byte HART unique address.
///
/// The two most significant bits of the first byte carry the master and
/// burst mode flags, the remaining 14 bits the device type code, followed by
/// the 3-byte device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    master: MasterAddress,
    burst_mode: bool,
    device_type: u16,
    device_id: u32,
}

impl Address {
    /// Creates an address, rejecting values that do not fit their bit width.
    pub fn new(
        master: MasterAddress,
        burst_mode: bool,
        device_type: u16,
        device_id: u32,
    ) -> Result<Self, FrameError> {
        if device_type > MAX_DEVICE_TYPE {
            return Err(FrameError::InvalidAddress(format!(
                "device type 0x{device_type:04X} exceeds 14 bits"
            )));
        }
        if device_id > MAX_DEVICE_ID {
            return Err(FrameError::InvalidAddress(format!(
                "device id 0x{device_id:X} exceeds 24 bits"
            )));
        }
        Ok(Address {
            master,
            burst_mode,
            device_type,
            device_id,
        })
    }

    pub fn master(&self) -> MasterAddress {
        self.master
    }

    pub fn burst_mode(&self) -> bool {
        self.burst_mode
    }

    pub fn device_type(&self) -> u16 {
        self.device_type
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Serializes the address into its 5-byte wire form.
    pub fn to_bytes(&self) -> [u8; UNIQUE_ADDRESS_LEN] {
        let [type_hi, type_lo] = self.device_type.to_be_bytes();
        let [_, id_hi, id_mid, id_lo] = self.device_id.to_be_bytes();

        let mut first = type_hi;
        first = assign_mask(first, ADDRESS_MASTER_MASK, self.master == MasterAddress::Primary);
        first = assign_mask(first, ADDRESS_BURST_MASK, self.burst_mode);

        [first, type_lo, id_hi, id_mid, id_lo]
    }

    /// Reads an address from its 5-byte wire form. Every bit pattern is valid.
    pub fn from_bytes(bytes: [u8; UNIQUE_ADDRESS_LEN]) -> Self {
        let master = if test_mask(bytes[0], ADDRESS_MASTER_MASK) {
            MasterAddress::Primary
        } else {
            MasterAddress::Secondary
        };
        let burst_mode = test_mask(bytes[0], ADDRESS_BURST_MASK);
        let type_hi = bytes[0] & !(ADDRESS_MASTER_MASK | ADDRESS_BURST_MASK);

        Address {
            master,
            burst_mode,
            device_type: u16::from_be_bytes([type_hi, bytes[1]]),
            device_id: u32::from_be_bytes([0, bytes[2], bytes[3], bytes[4]]),
        }
    }

    /// True if both addresses name the same field device, whatever master
    /// or burst flags they carry.
    pub fn same_device(&self, other: &Address) -> bool {
        self.device_type == other.device_type && self.device_id == other.device_id
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let master = match self.master {
            MasterAddress::Primary => "primary",
            MasterAddress::Secondary => "secondary",
        };
        write!(
            f,
            "{master}{} type=0x{:04X} id=0x{:06X}",
            if self.burst_mode { "+burst" } else { "" },
            self.device_type,
            self.device_id
        )
    }
}

/// Address format selected by the delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// 1-byte polling address
    Polling,
    /// 5-byte unique address
    Unique,
}

/// Frame type carried in the low delimiter bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Burst frame from a field device
    Back,
    /// Master to field device
    Stx,
    /// Field device to master
    Ack,
}

impl FrameType {
    pub fn code(self) -> u8 {
        match self {
            FrameType::Back => FRAME_TYPE_BACK,
            FrameType::Stx => FRAME_TYPE_STX,
            FrameType::Ack => FRAME_TYPE_ACK,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            FRAME_TYPE_BACK => Some(FrameType::Back),
            FRAME_TYPE_STX => Some(FrameType::Stx),
            FRAME_TYPE_ACK => Some(FrameType::Ack),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameType::Back => "BACK",
            FrameType::Stx => "STX",
            FrameType::Ack => "ACK",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The first byte of a frame. Physical layer type is fixed to asynchronous
/// FSK and no expansion bytes are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub address_type: AddressType,
    pub frame_type: FrameType,
}

impl Delimiter {
    pub const fn new(address_type: AddressType, frame_type: FrameType) -> Self {
        Delimiter {
            address_type,
            frame_type,
        }
    }

    pub fn to_byte(self) -> u8 {
        let base = match self.address_type {
            AddressType::Unique => DELIMITER_UNIQUE_ADDRESS,
            AddressType::Polling => 0x00,
        };
        set_mask(base, self.frame_type.code())
    }

    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        if field(byte, DELIMITER_EXPANSION_MASK) != 0 {
            return Err(FrameError::MalformedFrame(format!(
                "delimiter 0x{byte:02X} announces expansion bytes"
            )));
        }
        if field(byte, DELIMITER_PHYSICAL_LAYER_MASK) != 0 {
            return Err(FrameError::MalformedFrame(format!(
                "delimiter 0x{byte:02X} is not asynchronous FSK"
            )));
        }
        let frame_type = FrameType::from_code(field(byte, DELIMITER_FRAME_TYPE_MASK)).ok_or_else(
            || FrameError::MalformedFrame(format!("delimiter 0x{byte:02X} has unknown frame type")),
        )?;
        let address_type = if test_mask(byte, DELIMITER_UNIQUE_ADDRESS) {
            AddressType::Unique
        } else {
            AddressType::Polling
        };
        Ok(Delimiter::new(address_type, frame_type))
    }
}

/// Byte count of the data field defined for `command`.
pub fn command_byte_count(command: u8) -> Option<usize> {
    match command {
        COMMAND_48 => Some(COMMAND_48_BYTE_COUNT),
        _ => None,
    }
}

/// XOR-fold of `bytes`; `0x00` for empty input.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// One complete, checksum-valid PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    delimiter: Delimiter,
    address: Address,
    command: u8,
}

impl Frame {
    /// Builds a frame of the given type with unique addressing.
    pub fn build(
        frame_type: FrameType,
        address: &Address,
        command: u8,
        data: &[u8],
    ) -> Result<Frame, FrameError> {
        let expected = command_byte_count(command).ok_or(FrameError::UnsupportedCommand(command))?;
        if data.len() != expected {
            return Err(FrameError::InvalidPayloadLength {
                command,
                expected,
                actual: data.len(),
            });
        }

        let delimiter = Delimiter::new(AddressType::Unique, frame_type);
        let mut buf = BytesMut::with_capacity(MIN_FRAME_LEN + data.len());
        buf.put_u8(delimiter.to_byte());
        buf.put_slice(&address.to_bytes());
        buf.put_u8(command);
        buf.put_u8(data.len() as u8);
        buf.put_slice(data);
        let check = checksum(&buf);
        buf.put_u8(check);

        Ok(Frame {
            bytes: buf.freeze(),
            delimiter,
            address: *address,
            command,
        })
    }

    /// Validates and parses a received frame.
    ///
    /// The checksum is verified before the structure, so any corruption of a
    /// valid frame reports `ChecksumMismatch`.
    pub fn parse(input: &[u8]) -> Result<Frame, FrameError> {
        if input.len() < MIN_FRAME_LEN {
            return Err(FrameError::MalformedFrame(format!(
                "frame too short: {} bytes",
                input.len()
            )));
        }

        let (body, trailer) = input.split_at(input.len() - 1);
        let calculated = checksum(body);
        if calculated != trailer[0] {
            return Err(FrameError::ChecksumMismatch {
                expected: trailer[0],
                calculated,
            });
        }

        let (rest, (delimiter, address, command, byte_count)) = parse_header(input)
            .map_err(|e| FrameError::MalformedFrame(format!("header: {e:?}")))?;
        let (rest, _data) = parse_body(rest, byte_count as usize)
            .map_err(|_| FrameError::MalformedFrame(format!(
                "length {} does not match byte count {}",
                input.len(),
                byte_count
            )))?;
        if !rest.is_empty() {
            return Err(FrameError::MalformedFrame(format!(
                "length {} does not match byte count {}",
                input.len(),
                byte_count
            )));
        }

        let delimiter = Delimiter::from_byte(delimiter)?;
        if delimiter.address_type != AddressType::Unique {
            return Err(FrameError::MalformedFrame(
                "polling address frames are not supported".into(),
            ));
        }
        let address = <[u8; UNIQUE_ADDRESS_LEN]>::try_from(address)
            .map(Address::from_bytes)
            .map_err(|_| FrameError::MalformedFrame("truncated address".into()))?;

        Ok(Frame {
            bytes: Bytes::copy_from_slice(input),
            delimiter,
            address,
            command,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle on the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn frame_type(&self) -> FrameType {
        self.delimiter.frame_type
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn byte_count(&self) -> u8 {
        self.bytes[FRAME_HEADER_LEN - 1]
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_LEN..self.bytes.len() - 1]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }
}

/// Parses delimiter, address, command and byte count.
fn parse_header(input: &[u8]) -> IResult<&[u8], (u8, &[u8], u8, u8)> {
    let (input, delimiter) = be_u8(input)?;
    let (input, address) = take(UNIQUE_ADDRESS_LEN)(input)?;
    let (input, command) = be_u8(input)?;
    let (input, byte_count) = be_u8(input)?;
    Ok((input, (delimiter, address, command, byte_count)))
}

/// Parses the data field and the check byte.
fn parse_body(input: &[u8], byte_count: usize) -> IResult<&[u8], (&[u8], u8)> {
    let (input, data) = take(byte_count)(input)?;
    let (input, check) = be_u8(input)?;
    Ok((input, (data, check)))
}

/// Encodes a master-to-field-device (STX) request.
pub fn encode(address: &Address, command: u8, data: &[u8]) -> Result<Frame, FrameError> {
    Frame::build(FrameType::Stx, address, command, data)
}

/// Decodes a received Command 48 frame into its response.
pub fn decode(bytes: &[u8]) -> Result<Command48Response, FrameError> {
    let frame = Frame::parse(bytes)?;
    Command48Response::from_frame(&frame)
}
