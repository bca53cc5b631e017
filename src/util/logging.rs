//! # Frame Logging Utilities
//!
//! Hex dump helpers for protocol debugging. Output goes through the `log`
//! facade, so nothing is formatted unless the target level is enabled.

use log::{log, log_enabled, Level};

/// Limit hex output to prevent log spam
const MAX_LOG_BYTES: usize = 64;

/// Log frame data in hex format at debug level
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    log_frame_hex_at(Level::Debug, prefix, data);
}

/// Log frame data in hex format at the given level
pub fn log_frame_hex_at(level: Level, prefix: &str, data: &[u8]) {
    if !log_enabled!(target: "hart::frame", level) {
        return;
    }

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log!(target: "hart::frame", level, "{prefix}: {hex_str}{suffix}");
}

/// Log frame data together with its frame type and command
pub fn log_frame_structured(prefix: &str, data: &[u8], frame_type: Option<&str>, command: Option<u8>) {
    log::debug!(
        target: "hart::frame",
        "{}: {} bytes, type={:?}, command={:?}, data={}",
        prefix,
        data.len(),
        frame_type,
        command,
        crate::util::hex::format_hex_compact(&data[..data.len().min(32)])
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_without_logger_does_not_panic() {
        log_frame_hex("tx", &[0x82, 0x00, 0x2B]);
        log_frame_hex_at(Level::Trace, "rx", &[0xFF; 100]);
        log_frame_structured("rx", &[0x86; 40], Some("ACK"), Some(0x30));
    }
}
