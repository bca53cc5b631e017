//! # hart-rs - A Rust Crate for the HART Data-Link Layer
//!
//! The hart-rs crate implements a secondary master for the HART (Highway
//! Addressable Remote Transducer) protocol over an asynchronous FSK modem. It
//! polls a single field device for its extended status with Command 48
//! (Read Additional Device Status).
//!
//! ## Features
//!
//! - Bit-exact encoding and decoding of HART frames with unique addressing
//! - Decoding of the Command 48 status bytes into named diagnostics
//! - A master MAC state machine with bounded retries, response deadlines
//!   derived from the character time, `Busy` rejection and reset cancellation
//! - A serial modem physical layer over tokio-serial, and a scripted mock for
//!   tests
//! - JSON configuration and logging through the `log` facade
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! hart-rs = "0.1.0"
//! ```
//!
//! ```rust
//! use hart_rs::hart::serial_mock::MockPhysicalLayer;
//! use hart_rs::{Address, MacConfig, MasterAddress, MasterMac};
//!
//! # tokio_test::block_on(async {
//! let device = Address::new(MasterAddress::Secondary, false, 0x002B, 0x12_3456).unwrap();
//! let modem = MockPhysicalLayer::new();
//! modem.queue_ack_response(&device, [0, 0x10, 0, 0, 0, 0, 0, 0]);
//!
//! let mac = MasterMac::new(modem, MacConfig::default());
//! let result = mac.read_additional_status(&device).await.unwrap();
//! assert!(result.diagnostics().unwrap().config_corrupt);
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod hart;
pub mod logging;
pub mod util;

pub use crate::config::{DeviceConfig, HartConfig};
pub use crate::error::{FrameError, HartError, PhysError};
pub use crate::logging::{init_logger, init_logger_with_default};

// Core HART types
pub use hart::diagnostics::{Command48Response, DeviceDiagnostics, DiagnosticFlag};
pub use hart::frame::{checksum, decode, encode, Address, Frame, FrameType, MasterAddress};
pub use hart::mac::{
    FailureReason, MacConfig, MacState, MacStatistics, MasterMac, RetryCause, TransactionResult,
};
pub use hart::physical::PhysicalLayer;
pub use hart::serial::{SerialConfig, SerialPhysicalLayer};

/// Opens the modem described by `config` and wraps it in a master MAC.
///
/// # Arguments
/// * `config` - Serial port and MAC settings
///
/// # Returns
/// * `Ok(MasterMac)` - Idle master ready to poll
/// * `Err(HartError)` - The port could not be opened
pub async fn connect(config: &HartConfig) -> Result<MasterMac<SerialPhysicalLayer>, HartError> {
    config.validate()?;
    let phys = SerialPhysicalLayer::connect(config.serial.clone()).await?;
    Ok(MasterMac::new(phys, config.mac.clone()))
}

/// Polls `address` with Command 48.
///
/// # Arguments
/// * `mac` - Master to issue the request through
/// * `address` - Field device to poll
///
/// # Returns
/// * `Ok(TransactionResult)` - Diagnostics, or the reason none were obtained
/// * `Err(HartError)` - The master was busy
pub async fn read_additional_status<P: PhysicalLayer>(
    mac: &MasterMac<P>,
    address: &Address,
) -> Result<TransactionResult, HartError> {
    mac.read_additional_status(address).await
}
