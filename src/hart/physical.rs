//! Physical layer boundary consumed by the master MAC.
//!
//! Implementations wrap a modem (see [`crate::hart::serial`]) or a scripted
//! test double (see [`crate::hart::serial_mock`]).

use std::time::Duration;

use crate::error::PhysError;

/// Byte-oriented access to a HART FSK modem.
#[async_trait::async_trait]
pub trait PhysicalLayer: Send {
    /// Asserts request-to-send so the modem starts its carrier.
    async fn enable_transmit(&mut self) -> Result<(), PhysError>;

    /// Releases request-to-send once the last byte has left the UART.
    async fn disable_transmit(&mut self) -> Result<(), PhysError>;

    async fn write_byte(&mut self, byte: u8) -> Result<(), PhysError>;

    /// Receives one octet, failing with [`PhysError::Timeout`] when nothing
    /// arrives within `timeout`.
    async fn read_byte(&mut self, timeout: Duration) -> Result<u8, PhysError>;

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), PhysError> {
        for &byte in bytes {
            self.write_byte(byte).await?;
        }
        Ok(())
    }

    /// Carrier detect status.
    fn carrier_present(&mut self) -> bool;

    /// Asserts and releases the physical reset, discarding buffered data.
    async fn reset(&mut self);
}
