//! # HART Serial Modem
//!
//! [`PhysicalLayer`] over a HART FSK modem attached to a serial port. The
//! modem's RTS line keys the transmitter and its DCD line reports carrier.
//! FSK modems run at 1200 baud, 8 data bits, odd parity, 1 stop bit.

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use crate::constants::FSK_BAUDRATE;
use crate::error::{HartError, PhysError};
use crate::hart::physical::PhysicalLayer;

/// Bits per character: start, 8 data, parity, stop.
const BITS_PER_CHARACTER: u64 = 11;

/// Configuration for serial connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    /// Blocking I/O timeout of the underlying port
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: FSK_BAUDRATE,
            timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Time on the wire for `count` characters.
    pub fn transmission_time(&self, count: usize) -> Duration {
        let baudrate = u64::from(self.baudrate.max(1));
        Duration::from_micros(count as u64 * BITS_PER_CHARACTER * 1_000_000 / baudrate)
    }
}

/// Modem handle, encapsulating the tokio_serial stream.
pub struct SerialPhysicalLayer {
    port: SerialStream,
    config: SerialConfig,
    /// Bytes written since transmit was enabled
    pending: usize,
}

impl SerialPhysicalLayer {
    /// Opens the port with HART character framing and the transmitter off.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(config: SerialConfig) -> Result<Self, HartError> {
        let mut port = tokio_serial::new(config.port.as_str(), config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::Odd)
            .timeout(config.timeout())
            .open_native_async()
            .map_err(|e| HartError::SerialPortError(e.to_string()))?;

        port.write_request_to_send(false)
            .map_err(|e| HartError::SerialPortError(e.to_string()))?;
        debug!("opened {} at {} baud", config.port, config.baudrate);

        Ok(SerialPhysicalLayer {
            port,
            config,
            pending: 0,
        })
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl PhysicalLayer for SerialPhysicalLayer {
    async fn enable_transmit(&mut self) -> Result<(), PhysError> {
        self.pending = 0;
        self.port
            .write_request_to_send(true)
            .map_err(|e| PhysError::Io(e.to_string()))
    }

    async fn disable_transmit(&mut self) -> Result<(), PhysError> {
        AsyncWriteExt::flush(&mut self.port).await?;
        // The driver has no drain; wait out the bytes still in the UART.
        tokio::time::sleep(self.config.transmission_time(self.pending)).await;
        self.pending = 0;
        self.port
            .write_request_to_send(false)
            .map_err(|e| PhysError::Io(e.to_string()))
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), PhysError> {
        self.write_all(&[byte]).await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), PhysError> {
        AsyncWriteExt::write_all(&mut self.port, bytes).await?;
        self.pending += bytes.len();
        Ok(())
    }

    async fn read_byte(&mut self, deadline: Duration) -> Result<u8, PhysError> {
        match timeout(deadline, AsyncReadExt::read_u8(&mut self.port)).await {
            Ok(result) => result.map_err(PhysError::from),
            Err(_) => Err(PhysError::Timeout),
        }
    }

    fn carrier_present(&mut self) -> bool {
        match self.port.read_carrier_detect() {
            Ok(present) => present,
            Err(e) => {
                warn!("carrier detect unavailable: {e}");
                false
            }
        }
    }

    async fn reset(&mut self) {
        if let Err(e) = self.port.write_request_to_send(false) {
            warn!("failed to release RTS on reset: {e}");
        }
        if let Err(e) = self.port.clear(ClearBuffer::All) {
            warn!("failed to clear port buffers on reset: {e}");
        }
        self.pending = 0;
    }
}
