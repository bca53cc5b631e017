//! Configuration file round trips.

use hart_rs::{HartConfig, HartError};
use tempfile::TempDir;

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hart.json");

    let mut config = HartConfig::default();
    config.serial.port = "/dev/ttyAMA0".to_string();
    config.mac.max_retries = 4;
    config.mac.preamble_length = 10;
    config.device.device_type = 0x2B;
    config.device.device_id = 0x12_3456;

    config.save_to_file(&path).unwrap();
    let loaded = HartConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);

    let address = loaded.device.address().unwrap();
    assert_eq!(address.device_id(), 0x12_3456);
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = HartConfig::load_from_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(HartError::Config(_))));
}

#[test]
fn test_empty_object_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, "{}").unwrap();

    let loaded = HartConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, HartConfig::default());
    assert_eq!(
        loaded.mac.response_timeout(),
        std::time::Duration::from_micros(41 * 9_167)
    );
}
