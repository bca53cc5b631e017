//! # Command 48 Diagnostic Decoder
//!
//! Command 48 (Read Additional Device Status) returns an 8-byte data field.
//! Bytes 0 and 7 are unused padding; bytes 1 to 6 carry status bits:
//!
//! | Byte | Type              | Content                                        |
//! |------|-------------------|------------------------------------------------|
//! | 1    | [`CriticalStatus`] | configuration, characterization, DAC, diagnostics |
//! | 2    | [`SensorStatus`]   | calibration and sensor 1 range                  |
//! | 3    | [`InputStatus`]    | analog output saturation, input faults          |
//! | 4    | [`SupplyStatus`]   | supply, watchdog, input range, sensor 2 range   |
//! | 5    | [`SafetyStatus`]   | SIL diagnostics                                 |
//! | 6    | [`ExtendedStatus`] | device variable alert                           |
//!
//! Reserved bits are ignored. Decoding never fails for an 8-byte input.

use bitflags::bitflags;

use crate::constants::{COMMAND_48, COMMAND_48_BYTE_COUNT};
use crate::error::FrameError;
use crate::hart::frame::{Address, Frame, FrameType};
use crate::util::bits::test_mask;

bitflags! {
    /// Byte 1: critical status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CriticalStatus: u8 {
        const DIAGNOSTICS_FAILURE = 0x01;
        const DAC_FAILURE = 0x02;
        const SENSOR_INPUT_FAILURE = 0x04;
        const CHAR_TABLE_CRC = 0x08;
        const CONFIG_CORRUPT = 0x10;
    }
}

bitflags! {
    /// Byte 2: non-critical sensor and calibration status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SensorStatus: u8 {
        const CORE_TEMP_OUT_OF_RANGE = 0x01;
        const NO_FACTORY_CALIBRATION = 0x02;
        const PV_OUT_OF_RANGE = 0x04;
        const COLD_JUNCTION_TEMP = 0x08;
        const SENSOR1_EXCESS_LRV = 0x10;
        const SENSOR1_EXCESS_URV = 0x20;
        const FIXED_CURRENT_MODE = 0x40;
        const USER_CORRECTION_ACTIVE = 0x80;
    }
}

bitflags! {
    /// Byte 3: non-critical output and input status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputStatus: u8 {
        const INPUT_SUSPECT = 0x01;
        const NO_DAC_COMPENSATION = 0x02;
        const INPUT1_FAULT = 0x10;
        const INPUT2_FAULT = 0x20;
        const ANALOG_OUTPUT_SATURATED = 0x40;
    }
}

bitflags! {
    /// Byte 4: non-critical supply and range status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SupplyStatus: u8 {
        const EXCESS_DELTA_DETECTED = 0x01;
        const ADC_FAULT = 0x02;
        const SENSOR2_EXCESS_LRV = 0x04;
        const SENSOR2_EXCESS_URV = 0x08;
        const INPUT1_OUT_OF_RANGE = 0x10;
        const INPUT2_OUT_OF_RANGE = 0x20;
        const WATCHDOG_RESET = 0x40;
        const SUPPLY_VOLTAGE_FAULT = 0x80;
    }
}

bitflags! {
    /// Byte 5: safety status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SafetyStatus: u8 {
        const SIL_DIAGNOSTIC = 0x01;
    }
}

bitflags! {
    /// Byte 6: extended device status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExtendedStatus: u8 {
        /// Set when a critical or non-critical error has been detected
        const DEVICE_VARIABLE_ALERT = 0x02;
    }
}

/// The six status bytes of a Command 48 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusBytes {
    pub critical: CriticalStatus,
    pub sensor: SensorStatus,
    pub input: InputStatus,
    pub supply: SupplyStatus,
    pub safety: SafetyStatus,
    pub extended: ExtendedStatus,
}

impl StatusBytes {
    pub fn from_payload(data: &[u8; COMMAND_48_BYTE_COUNT]) -> Self {
        StatusBytes {
            critical: CriticalStatus::from_bits_truncate(data[1]),
            sensor: SensorStatus::from_bits_truncate(data[2]),
            input: InputStatus::from_bits_truncate(data[3]),
            supply: SupplyStatus::from_bits_truncate(data[4]),
            safety: SafetyStatus::from_bits_truncate(data[5]),
            extended: ExtendedStatus::from_bits_truncate(data[6]),
        }
    }

    /// Rebuilds a payload with zeroed padding bytes.
    pub fn to_payload(&self) -> [u8; COMMAND_48_BYTE_COUNT] {
        [
            0x00,
            self.critical.bits(),
            self.sensor.bits(),
            self.input.bits(),
            self.supply.bits(),
            self.safety.bits(),
            self.extended.bits(),
            0x00,
        ]
    }
}

/// Every named diagnostic bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticFlag {
    ConfigCorrupt,
    CharTableCrc,
    SensorInputFailure,
    DacFailure,
    DiagnosticsFailure,
    UserCorrectionActive,
    FixedCurrentMode,
    Sensor1ExcessUrv,
    Sensor1ExcessLrv,
    ColdJunctionTemp,
    PvOutOfRange,
    NoFactoryCalibration,
    CoreTempOutOfRange,
    AnalogOutputSaturated,
    Input2Fault,
    Input1Fault,
    NoDacCompensation,
    InputSuspect,
    SupplyVoltageFault,
    WatchdogReset,
    Input2OutOfRange,
    Input1OutOfRange,
    Sensor2ExcessUrv,
    Sensor2ExcessLrv,
    AdcFault,
    ExcessDeltaDetected,
    SilDiagnostic,
    DeviceVariableAlert,
}

impl DiagnosticFlag {
    pub const ALL: [DiagnosticFlag; 28] = [
        DiagnosticFlag::ConfigCorrupt,
        DiagnosticFlag::CharTableCrc,
        DiagnosticFlag::SensorInputFailure,
        DiagnosticFlag::DacFailure,
        DiagnosticFlag::DiagnosticsFailure,
        DiagnosticFlag::UserCorrectionActive,
        DiagnosticFlag::FixedCurrentMode,
        DiagnosticFlag::Sensor1ExcessUrv,
        DiagnosticFlag::Sensor1ExcessLrv,
        DiagnosticFlag::ColdJunctionTemp,
        DiagnosticFlag::PvOutOfRange,
        DiagnosticFlag::NoFactoryCalibration,
        DiagnosticFlag::CoreTempOutOfRange,
        DiagnosticFlag::AnalogOutputSaturated,
        DiagnosticFlag::Input2Fault,
        DiagnosticFlag::Input1Fault,
        DiagnosticFlag::NoDacCompensation,
        DiagnosticFlag::InputSuspect,
        DiagnosticFlag::SupplyVoltageFault,
        DiagnosticFlag::WatchdogReset,
        DiagnosticFlag::Input2OutOfRange,
        DiagnosticFlag::Input1OutOfRange,
        DiagnosticFlag::Sensor2ExcessUrv,
        DiagnosticFlag::Sensor2ExcessLrv,
        DiagnosticFlag::AdcFault,
        DiagnosticFlag::ExcessDeltaDetected,
        DiagnosticFlag::SilDiagnostic,
        DiagnosticFlag::DeviceVariableAlert,
    ];

    /// Payload index and bit mask of the flag.
    pub fn location(self) -> (usize, u8) {
        use DiagnosticFlag::*;
        match self {
            ConfigCorrupt => (1, CriticalStatus::CONFIG_CORRUPT.bits()),
            CharTableCrc => (1, CriticalStatus::CHAR_TABLE_CRC.bits()),
            SensorInputFailure => (1, CriticalStatus::SENSOR_INPUT_FAILURE.bits()),
            DacFailure => (1, CriticalStatus::DAC_FAILURE.bits()),
            DiagnosticsFailure => (1, CriticalStatus::DIAGNOSTICS_FAILURE.bits()),
            UserCorrectionActive => (2, SensorStatus::USER_CORRECTION_ACTIVE.bits()),
            FixedCurrentMode => (2, SensorStatus::FIXED_CURRENT_MODE.bits()),
            Sensor1ExcessUrv => (2, SensorStatus::SENSOR1_EXCESS_URV.bits()),
            Sensor1ExcessLrv => (2, SensorStatus::SENSOR1_EXCESS_LRV.bits()),
            ColdJunctionTemp => (2, SensorStatus::COLD_JUNCTION_TEMP.bits()),
            PvOutOfRange => (2, SensorStatus::PV_OUT_OF_RANGE.bits()),
            NoFactoryCalibration => (2, SensorStatus::NO_FACTORY_CALIBRATION.bits()),
            CoreTempOutOfRange => (2, SensorStatus::CORE_TEMP_OUT_OF_RANGE.bits()),
            AnalogOutputSaturated => (3, InputStatus::ANALOG_OUTPUT_SATURATED.bits()),
            Input2Fault => (3, InputStatus::INPUT2_FAULT.bits()),
            Input1Fault => (3, InputStatus::INPUT1_FAULT.bits()),
            NoDacCompensation => (3, InputStatus::NO_DAC_COMPENSATION.bits()),
            InputSuspect => (3, InputStatus::INPUT_SUSPECT.bits()),
            SupplyVoltageFault => (4, SupplyStatus::SUPPLY_VOLTAGE_FAULT.bits()),
            WatchdogReset => (4, SupplyStatus::WATCHDOG_RESET.bits()),
            Input2OutOfRange => (4, SupplyStatus::INPUT2_OUT_OF_RANGE.bits()),
            Input1OutOfRange => (4, SupplyStatus::INPUT1_OUT_OF_RANGE.bits()),
            Sensor2ExcessUrv => (4, SupplyStatus::SENSOR2_EXCESS_URV.bits()),
            Sensor2ExcessLrv => (4, SupplyStatus::SENSOR2_EXCESS_LRV.bits()),
            AdcFault => (4, SupplyStatus::ADC_FAULT.bits()),
            ExcessDeltaDetected => (4, SupplyStatus::EXCESS_DELTA_DETECTED.bits()),
            SilDiagnostic => (5, SafetyStatus::SIL_DIAGNOSTIC.bits()),
            DeviceVariableAlert => (6, ExtendedStatus::DEVICE_VARIABLE_ALERT.bits()),
        }
    }

    /// Critical flags live in status byte 1.
    pub fn is_critical(self) -> bool {
        self.location().0 == 1
    }

    pub fn name(self) -> &'static str {
        use DiagnosticFlag::*;
        match self {
            ConfigCorrupt => "configuration corrupt",
            CharTableCrc => "characterization table CRC failure",
            SensorInputFailure => "sensor input failure",
            DacFailure => "DAC failure",
            DiagnosticsFailure => "diagnostics failure",
            UserCorrectionActive => "user correction active",
            FixedCurrentMode => "fixed current mode",
            Sensor1ExcessUrv => "sensor 1 excess URV",
            Sensor1ExcessLrv => "sensor 1 excess LRV",
            ColdJunctionTemp => "cold junction temperature out of range",
            PvOutOfRange => "PV out of range",
            NoFactoryCalibration => "no factory calibration",
            CoreTempOutOfRange => "core temperature out of range",
            AnalogOutputSaturated => "analog output saturated",
            Input2Fault => "input 2 fault",
            Input1Fault => "input 1 fault",
            NoDacCompensation => "no DAC compensation",
            InputSuspect => "input suspect",
            SupplyVoltageFault => "supply voltage fault",
            WatchdogReset => "watchdog reset",
            Input2OutOfRange => "input 2 out of range",
            Input1OutOfRange => "input 1 out of range",
            Sensor2ExcessUrv => "sensor 2 excess URV",
            Sensor2ExcessLrv => "sensor 2 excess LRV",
            AdcFault => "ADC fault",
            ExcessDeltaDetected => "excess delta detected",
            SilDiagnostic => "SIL diagnostic",
            DeviceVariableAlert => "device variable alert",
        }
    }
}

/// Application-facing diagnostics, one named field per status bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceDiagnostics {
    // byte 1
    pub config_corrupt: bool,
    pub char_table_crc: bool,
    pub sensor_input_failure: bool,
    pub dac_failure: bool,
    pub diagnostics_failure: bool,
    // byte 2
    pub user_correction_active: bool,
    pub fixed_current_mode: bool,
    pub sensor1_excess_urv: bool,
    pub sensor1_excess_lrv: bool,
    pub cold_junction_temp: bool,
    pub pv_out_of_range: bool,
    pub no_factory_calibration: bool,
    pub core_temp_out_of_range: bool,
    // byte 3
    pub analog_output_saturated: bool,
    pub input2_fault: bool,
    pub input1_fault: bool,
    pub no_dac_compensation: bool,
    pub input_suspect: bool,
    // byte 4
    pub supply_voltage_fault: bool,
    pub watchdog_reset: bool,
    pub input2_out_of_range: bool,
    pub input1_out_of_range: bool,
    pub sensor2_excess_urv: bool,
    pub sensor2_excess_lrv: bool,
    pub adc_fault: bool,
    pub excess_delta_detected: bool,
    // byte 5
    pub sil_diagnostic: bool,
    // byte 6
    pub device_variable_alert: bool,
}

impl DeviceDiagnostics {
    pub fn is_set(&self, flag: DiagnosticFlag) -> bool {
        use DiagnosticFlag::*;
        match flag {
            ConfigCorrupt => self.config_corrupt,
            CharTableCrc => self.char_table_crc,
            SensorInputFailure => self.sensor_input_failure,
            DacFailure => self.dac_failure,
            DiagnosticsFailure => self.diagnostics_failure,
            UserCorrectionActive => self.user_correction_active,
            FixedCurrentMode => self.fixed_current_mode,
            Sensor1ExcessUrv => self.sensor1_excess_urv,
            Sensor1ExcessLrv => self.sensor1_excess_lrv,
            ColdJunctionTemp => self.cold_junction_temp,
            PvOutOfRange => self.pv_out_of_range,
            NoFactoryCalibration => self.no_factory_calibration,
            CoreTempOutOfRange => self.core_temp_out_of_range,
            AnalogOutputSaturated => self.analog_output_saturated,
            Input2Fault => self.input2_fault,
            Input1Fault => self.input1_fault,
            NoDacCompensation => self.no_dac_compensation,
            InputSuspect => self.input_suspect,
            SupplyVoltageFault => self.supply_voltage_fault,
            WatchdogReset => self.watchdog_reset,
            Input2OutOfRange => self.input2_out_of_range,
            Input1OutOfRange => self.input1_out_of_range,
            Sensor2ExcessUrv => self.sensor2_excess_urv,
            Sensor2ExcessLrv => self.sensor2_excess_lrv,
            AdcFault => self.adc_fault,
            ExcessDeltaDetected => self.excess_delta_detected,
            SilDiagnostic => self.sil_diagnostic,
            DeviceVariableAlert => self.device_variable_alert,
        }
    }

    /// Flags currently set, in table order.
    pub fn active_flags(&self) -> Vec<DiagnosticFlag> {
        DiagnosticFlag::ALL
            .into_iter()
            .filter(|flag| self.is_set(*flag))
            .collect()
    }

    pub fn has_critical_fault(&self) -> bool {
        self.active_flags().iter().any(|flag| flag.is_critical())
    }

    pub fn has_any_fault(&self) -> bool {
        *self != DeviceDiagnostics::default()
    }
}

/// Maps an 8-byte Command 48 payload to named diagnostics.
pub fn decode(data: &[u8; COMMAND_48_BYTE_COUNT]) -> DeviceDiagnostics {
    let [_, b1, b2, b3, b4, b5, b6, _] = *data;

    DeviceDiagnostics {
        config_corrupt: test_mask(b1, CriticalStatus::CONFIG_CORRUPT.bits()),
        char_table_crc: test_mask(b1, CriticalStatus::CHAR_TABLE_CRC.bits()),
        sensor_input_failure: test_mask(b1, CriticalStatus::SENSOR_INPUT_FAILURE.bits()),
        dac_failure: test_mask(b1, CriticalStatus::DAC_FAILURE.bits()),
        diagnostics_failure: test_mask(b1, CriticalStatus::DIAGNOSTICS_FAILURE.bits()),

        user_correction_active: test_mask(b2, SensorStatus::USER_CORRECTION_ACTIVE.bits()),
        fixed_current_mode: test_mask(b2, SensorStatus::FIXED_CURRENT_MODE.bits()),
        sensor1_excess_urv: test_mask(b2, SensorStatus::SENSOR1_EXCESS_URV.bits()),
        sensor1_excess_lrv: test_mask(b2, SensorStatus::SENSOR1_EXCESS_LRV.bits()),
        cold_junction_temp: test_mask(b2, SensorStatus::COLD_JUNCTION_TEMP.bits()),
        pv_out_of_range: test_mask(b2, SensorStatus::PV_OUT_OF_RANGE.bits()),
        no_factory_calibration: test_mask(b2, SensorStatus::NO_FACTORY_CALIBRATION.bits()),
        core_temp_out_of_range: test_mask(b2, SensorStatus::CORE_TEMP_OUT_OF_RANGE.bits()),

        analog_output_saturated: test_mask(b3, InputStatus::ANALOG_OUTPUT_SATURATED.bits()),
        input2_fault: test_mask(b3, InputStatus::INPUT2_FAULT.bits()),
        input1_fault: test_mask(b3, InputStatus::INPUT1_FAULT.bits()),
        no_dac_compensation: test_mask(b3, InputStatus::NO_DAC_COMPENSATION.bits()),
        input_suspect: test_mask(b3, InputStatus::INPUT_SUSPECT.bits()),

        supply_voltage_fault: test_mask(b4, SupplyStatus::SUPPLY_VOLTAGE_FAULT.bits()),
        watchdog_reset: test_mask(b4, SupplyStatus::WATCHDOG_RESET.bits()),
        input2_out_of_range: test_mask(b4, SupplyStatus::INPUT2_OUT_OF_RANGE.bits()),
        input1_out_of_range: test_mask(b4, SupplyStatus::INPUT1_OUT_OF_RANGE.bits()),
        sensor2_excess_urv: test_mask(b4, SupplyStatus::SENSOR2_EXCESS_URV.bits()),
        sensor2_excess_lrv: test_mask(b4, SupplyStatus::SENSOR2_EXCESS_LRV.bits()),
        adc_fault: test_mask(b4, SupplyStatus::ADC_FAULT.bits()),
        excess_delta_detected: test_mask(b4, SupplyStatus::EXCESS_DELTA_DETECTED.bits()),

        sil_diagnostic: test_mask(b5, SafetyStatus::SIL_DIAGNOSTIC.bits()),

        device_variable_alert: test_mask(b6, ExtendedStatus::DEVICE_VARIABLE_ALERT.bits()),
    }
}

/// A validated Command 48 response.
///
/// Only ever built from a checksum-correct frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command48Response {
    frame_type: FrameType,
    address: Address,
    data: [u8; COMMAND_48_BYTE_COUNT],
    status: StatusBytes,
}

impl Command48Response {
    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        if frame.command() != COMMAND_48 {
            return Err(FrameError::MalformedFrame(format!(
                "unexpected command {} in response",
                frame.command()
            )));
        }
        let data = <[u8; COMMAND_48_BYTE_COUNT]>::try_from(frame.data()).map_err(|_| {
            FrameError::MalformedFrame(format!(
                "command 48 carries {} data bytes, expected {}",
                frame.data().len(),
                COMMAND_48_BYTE_COUNT
            ))
        })?;

        Ok(Command48Response {
            frame_type: frame.frame_type(),
            address: *frame.address(),
            data,
            status: StatusBytes::from_payload(&data),
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn command(&self) -> u8 {
        COMMAND_48
    }

    /// Raw payload including the padding bytes.
    pub fn data(&self) -> &[u8; COMMAND_48_BYTE_COUNT] {
        &self.data
    }

    pub fn status(&self) -> &StatusBytes {
        &self.status
    }

    pub fn diagnostics(&self) -> DeviceDiagnostics {
        decode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with(index: usize, mask: u8) -> [u8; 8] {
        let mut data = [0u8; 8];
        data[index] = mask;
        data
    }

    #[test]
    fn test_all_clear() {
        let diagnostics = decode(&[0u8; 8]);
        assert_eq!(diagnostics, DeviceDiagnostics::default());
        assert!(!diagnostics.has_any_fault());
        assert!(diagnostics.active_flags().is_empty());
    }

    #[test]
    fn test_padding_bytes_ignored() {
        let diagnostics = decode(&[0xFF, 0, 0, 0, 0, 0, 0, 0xFF]);
        assert!(!diagnostics.has_any_fault());
    }

    #[test]
    fn test_raw_bit_positions() {
        assert!(decode(&payload_with(1, 0x10)).config_corrupt);
        assert!(decode(&payload_with(1, 0x01)).diagnostics_failure);
        assert!(decode(&payload_with(2, 0x80)).user_correction_active);
        assert!(decode(&payload_with(2, 0x01)).core_temp_out_of_range);
        assert!(decode(&payload_with(3, 0x40)).analog_output_saturated);
        assert!(decode(&payload_with(3, 0x20)).input2_fault);
        assert!(decode(&payload_with(4, 0x80)).supply_voltage_fault);
        assert!(decode(&payload_with(4, 0x10)).input1_out_of_range);
        assert!(decode(&payload_with(5, 0x01)).sil_diagnostic);
        assert!(decode(&payload_with(6, 0x02)).device_variable_alert);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        // unused bits of bytes 1, 3, 5 and 6
        let data = [0x00, 0xE0, 0x00, 0x8C, 0x00, 0xFE, 0xFD, 0x00];
        assert!(!decode(&data).has_any_fault());

        let status = StatusBytes::from_payload(&data);
        assert_eq!(status, StatusBytes::default());
    }

    #[test]
    fn test_flag_locations_unique() {
        let mut seen = std::collections::HashSet::new();
        for flag in DiagnosticFlag::ALL {
            assert!(seen.insert(flag.location()), "duplicate location for {flag:?}");
        }
    }

    #[test]
    fn test_critical_classification() {
        let diagnostics = decode(&payload_with(1, 0x02));
        assert!(diagnostics.dac_failure);
        assert!(diagnostics.has_critical_fault());

        let diagnostics = decode(&payload_with(6, 0x02));
        assert!(diagnostics.has_any_fault());
        assert!(!diagnostics.has_critical_fault());
    }

    #[test]
    fn test_status_bytes_payload() {
        let data = [0x00, 0x10, 0x81, 0x30, 0x40, 0x01, 0x02, 0x00];
        let status = StatusBytes::from_payload(&data);
        assert!(status.critical.contains(CriticalStatus::CONFIG_CORRUPT));
        assert!(status.sensor.contains(SensorStatus::USER_CORRECTION_ACTIVE));
        assert!(status.input.contains(InputStatus::INPUT1_FAULT | InputStatus::INPUT2_FAULT));
        assert_eq!(status.to_payload(), data);
    }
}
