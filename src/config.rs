//! # Configuration
//!
//! Runtime configuration of a secondary master: serial port, MAC timing and
//! the polled field device. Every field has a default, so a JSON file only
//! needs the values it changes:
//!
//! ```json
//! {
//!   "serial": { "port": "/dev/ttyUSB1" },
//!   "mac": { "max_retries": 3 },
//!   "device": { "device_type": 43, "device_id": 1193046 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DEVICE_ID, DEFAULT_DEVICE_TYPE, MAX_PREAMBLE_LEN};
use crate::error::HartError;
use crate::hart::frame::{Address, MasterAddress};
use crate::hart::mac::MacConfig;
use crate::hart::serial::SerialConfig;

/// The field device being polled. Defaults to the STT700 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 14-bit manufacturer device type code
    pub device_type: u16,
    /// 24-bit device identifier
    pub device_id: u32,
    /// Address the device as the primary master would
    pub primary_master: bool,
    pub burst_mode: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            device_type: DEFAULT_DEVICE_TYPE,
            device_id: DEFAULT_DEVICE_ID,
            primary_master: false,
            burst_mode: false,
        }
    }
}

impl DeviceConfig {
    pub fn address(&self) -> Result<Address, HartError> {
        let master = if self.primary_master {
            MasterAddress::Primary
        } else {
            MasterAddress::Secondary
        };
        Ok(Address::new(
            master,
            self.burst_mode,
            self.device_type,
            self.device_id,
        )?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HartConfig {
    pub serial: SerialConfig,
    pub mac: MacConfig,
    pub device: DeviceConfig,
}

impl HartConfig {
    pub fn from_json(json: &str) -> Result<Self, HartError> {
        let config: HartConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, HartError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, HartError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HartError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), HartError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|e| {
            HartError::Config(format!("Failed to write config file '{}': {e}", path.display()))
        })
    }

    /// Rejects values the link cannot run with.
    pub fn validate(&self) -> Result<(), HartError> {
        if self.serial.baudrate == 0 {
            return Err(HartError::Config("baudrate must be non-zero".into()));
        }
        if usize::from(self.mac.preamble_length) > MAX_PREAMBLE_LEN {
            return Err(HartError::Config(format!(
                "preamble length {} exceeds {MAX_PREAMBLE_LEN}",
                self.mac.preamble_length
            )));
        }
        if self.mac.character_time_us == 0 || self.mac.response_timeout_chars == 0 {
            return Err(HartError::Config("response timeout must be non-zero".into()));
        }
        if self.mac.inter_byte_timeout_chars == 0 {
            return Err(HartError::Config("inter-byte timeout must be non-zero".into()));
        }
        self.device.address()?;
        Ok(())
    }
}
