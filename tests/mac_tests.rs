//! Master MAC tests driven through the scripted mock modem.

use std::sync::Arc;
use std::time::Duration;

use hart_rs::constants::{COMMAND_48, PREAMBLE_BYTE};
use hart_rs::hart::frame::{Frame, FrameType};
use hart_rs::hart::serial_mock::{ack_response_bytes, MockPhysicalLayer, Reply};
use hart_rs::{
    Address, FailureReason, FrameError, HartError, MacConfig, MacState, MasterAddress,
    MasterMac, PhysError, RetryCause, TransactionResult,
};

fn device() -> Address {
    Address::new(MasterAddress::Secondary, false, 0x002B, 0x12_3456).unwrap()
}

fn other_device() -> Address {
    Address::new(MasterAddress::Secondary, false, 0x002B, 0x65_4321).unwrap()
}

fn mac_with(mock: &MockPhysicalLayer, max_retries: u8) -> MasterMac<MockPhysicalLayer> {
    let config = MacConfig {
        max_retries,
        ..MacConfig::default()
    };
    MasterMac::new(mock.clone(), config)
}

fn exhausted(result: &TransactionResult) -> (u16, RetryCause) {
    match result.failure() {
        Some(FailureReason::RetriesExhausted {
            attempts,
            last_cause,
        }) => (*attempts, last_cause.clone()),
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

async fn wait_for_state<P: hart_rs::PhysicalLayer>(mac: &MasterMac<P>, state: MacState) {
    for _ in 0..1000 {
        if mac.state() == state {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("MAC never reached {state}, stuck in {}", mac.state());
}

#[tokio::test]
async fn test_retry_bound() {
    for max_retries in 0..=4u8 {
        let mock = MockPhysicalLayer::new();
        let mac = mac_with(&mock, max_retries);

        let result = mac.read_additional_status(&device()).await.unwrap();
        let (attempts, cause) = exhausted(&result);

        assert_eq!(attempts, u16::from(max_retries) + 1);
        assert_eq!(cause, RetryCause::Timeout);
        assert_eq!(mock.enable_count(), usize::from(max_retries) + 1);
        assert_eq!(mock.transmit_count(), usize::from(max_retries) + 1);
        assert_eq!(mac.state(), MacState::Idle);
    }
}

#[tokio::test]
async fn test_same_frame_resent_on_retry() {
    let mock = MockPhysicalLayer::new();
    let mac = mac_with(&mock, 1);
    mac.read_additional_status(&device()).await.unwrap();

    let tx = mock.tx_data();
    let (first, second) = tx.split_at(tx.len() / 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_success_after_corrupted_response() {
    let mock = MockPhysicalLayer::new();
    let mut corrupted = ack_response_bytes(&device(), &[0, 0x01, 0, 0, 0, 0, 0, 0]);
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0x20;
    mock.queue_reply(Reply::Bytes(corrupted));
    mock.queue_ack_response(&device(), [0, 0x01, 0, 0, 0, 0, 0, 0]);

    let mac = mac_with(&mock, 2);
    let result = mac.read_additional_status(&device()).await.unwrap();

    assert!(result.diagnostics().unwrap().diagnostics_failure);
    assert_eq!(mock.transmit_count(), 2);

    let stats = mac.statistics();
    assert_eq!(stats.checksum_errors, 1);
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.successes, 1);
}

#[tokio::test]
async fn test_busy_rejection() {
    let mock = MockPhysicalLayer::new();
    mock.queue_reply(Reply::Stall);
    let mac = Arc::new(mac_with(&mock, 0));

    let pending = {
        let mac = Arc::clone(&mac);
        tokio::spawn(async move { mac.read_additional_status(&device()).await })
    };
    wait_for_state(&mac, MacState::AwaitingResponse).await;

    let second = mac.read_additional_status(&other_device()).await;
    assert!(matches!(second, Err(HartError::Busy)));
    assert_eq!(mock.enable_count(), 1);

    mock.release();
    let first = pending.await.unwrap().unwrap();
    assert_eq!(exhausted(&first).1, RetryCause::Timeout);
    assert_eq!(mac.state(), MacState::Idle);
}

#[tokio::test]
async fn test_reset_cancels_pending_transaction() {
    let mock = MockPhysicalLayer::new();
    mock.queue_reply(Reply::Stall);
    let mac = Arc::new(mac_with(&mock, 2));

    let pending = {
        let mac = Arc::clone(&mac);
        tokio::spawn(async move { mac.read_additional_status(&device()).await })
    };
    wait_for_state(&mac, MacState::AwaitingResponse).await;

    mac.reset().await;
    let result = pending.await.unwrap().unwrap();

    assert_eq!(
        result,
        TransactionResult::CommunicationFailure(FailureReason::Reset)
    );
    assert_eq!(mac.state(), MacState::Idle);
    assert_eq!(mock.reset_count(), 1);
    assert_eq!(mock.transmit_count(), 1);

    let stats = mac.statistics();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.failures, 1);

    // the master is usable again
    mock.queue_ack_response(&device(), [0; 8]);
    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(result.is_success());
}

#[tokio::test]
async fn test_dropped_request_returns_to_idle() {
    let mock = MockPhysicalLayer::new();
    mock.queue_reply(Reply::Stall);
    let mac = mac_with(&mock, 0);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        mac.read_additional_status(&device()),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(mac.state(), MacState::Idle);

    mock.queue_ack_response(&device(), [0; 8]);
    assert!(mac.read_additional_status(&device()).await.unwrap().is_success());
}

#[tokio::test]
async fn test_carrier_blocks_transmit() {
    let mock = MockPhysicalLayer::new();
    mock.set_carrier(true);
    let mac = mac_with(&mock, 1);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert_eq!(exhausted(&result), (2, RetryCause::CarrierDetected));
    assert_eq!(mock.enable_count(), 0);
    assert!(mock.tx_data().is_empty());
}

#[tokio::test]
async fn test_carrier_ignored_when_disabled() {
    let mock = MockPhysicalLayer::new();
    mock.set_carrier(true);
    mock.queue_ack_response(&device(), [0; 8]);
    let config = MacConfig {
        check_carrier: false,
        ..MacConfig::default()
    };
    let mac = MasterMac::new(mock.clone(), config);

    assert!(mac.read_additional_status(&device()).await.unwrap().is_success());
}

#[tokio::test]
async fn test_response_from_other_device_rejected() {
    let mock = MockPhysicalLayer::new();
    mock.queue_ack_response(&other_device(), [0; 8]);
    let mac = mac_with(&mock, 0);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert_eq!(
        exhausted(&result).1,
        RetryCause::AddressMismatch {
            expected: device(),
            received: other_device(),
        }
    );
}

#[tokio::test]
async fn test_master_echo_rejected() {
    let mock = MockPhysicalLayer::new();
    let echo = Frame::build(FrameType::Stx, &device(), COMMAND_48, &[0; 8]).unwrap();
    let mut line = vec![PREAMBLE_BYTE; 5];
    line.extend_from_slice(echo.as_bytes());
    mock.queue_reply(Reply::Bytes(line));
    let mac = mac_with(&mock, 0);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert_eq!(
        exhausted(&result).1,
        RetryCause::UnexpectedFrameType(FrameType::Stx)
    );
}

#[tokio::test]
async fn test_physical_error_is_retried() {
    let mock = MockPhysicalLayer::new();
    mock.queue_reply(Reply::Error(PhysError::Parity));
    mock.queue_ack_response(&device(), [0; 8]);
    let mac = mac_with(&mock, 2);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(mac.statistics().phys_errors, 1);
}

#[tokio::test]
async fn test_truncated_response() {
    let mock = MockPhysicalLayer::new();
    let mut line = ack_response_bytes(&device(), &[0; 8]);
    line.truncate(12);
    mock.queue_reply(Reply::Bytes(line));
    let mac = mac_with(&mock, 0);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(matches!(
        exhausted(&result).1,
        RetryCause::Frame(FrameError::MalformedFrame(_))
    ));
    assert_eq!(mac.statistics().malformed_frames, 1);
}

#[tokio::test]
async fn test_endless_preamble_rejected() {
    let mock = MockPhysicalLayer::new();
    let mut line = vec![PREAMBLE_BYTE; 40];
    line.extend(ack_response_bytes(&device(), &[0; 8]));
    mock.queue_reply(Reply::Bytes(line));
    mock.queue_ack_response(&device(), [0; 8]);
    let mac = mac_with(&mock, 1);

    // the stale tail of the first reply is drained before the retry
    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(mac.statistics().malformed_frames, 1);
}

#[tokio::test]
async fn test_invalid_request_is_an_error() {
    let mock = MockPhysicalLayer::new();
    let mac = mac_with(&mock, 2);

    let err = mac.transmit_request(&device(), 0x00, &[]).await.unwrap_err();
    assert!(matches!(
        err,
        HartError::Frame(FrameError::UnsupportedCommand(0x00))
    ));
    assert_eq!(mock.enable_count(), 0);
    assert_eq!(mac.statistics().transactions, 0);
}

#[tokio::test]
async fn test_response_window_then_inter_byte_deadline() {
    let mock = MockPhysicalLayer::new();
    mock.queue_ack_response(&device(), [0; 8]);
    let mac = mac_with(&mock, 0);

    assert!(mac.read_additional_status(&device()).await.unwrap().is_success());

    let config = mac.config();
    let deadlines = mock.read_deadlines();
    // 5 preamble bytes and a 17-byte frame
    assert_eq!(deadlines.len(), 22);
    assert_eq!(deadlines[0], config.response_timeout());
    assert!(deadlines[1..]
        .iter()
        .all(|&deadline| deadline == config.inter_byte_timeout()));
    assert_ne!(config.response_timeout(), config.inter_byte_timeout());
}

#[tokio::test]
async fn test_noise_before_preamble_skipped() {
    let mock = MockPhysicalLayer::new();
    let mut line = vec![0x00, PREAMBLE_BYTE, 0x3C];
    line.extend(ack_response_bytes(&device(), &[0, 0x01, 0, 0, 0, 0, 0, 0]));
    mock.queue_reply(Reply::Bytes(line));
    let mac = mac_with(&mock, 0);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(result.diagnostics().unwrap().diagnostics_failure);

    let stats = mac.statistics();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.malformed_frames, 0);
}

#[tokio::test]
async fn test_reply_without_preamble_rejected() {
    let mock = MockPhysicalLayer::new();
    mock.queue_reply(Reply::Bytes(vec![0x00; 32]));
    let mac = mac_with(&mock, 0);

    let result = mac.read_additional_status(&device()).await.unwrap();
    assert!(matches!(
        exhausted(&result).1,
        RetryCause::Frame(FrameError::MalformedFrame(_))
    ));
}

#[tokio::test]
async fn test_silent_device_then_response() {
    let mock = MockPhysicalLayer::new();
    mock.queue_silence(2);
    mock.queue_ack_response(&device(), [0; 8]);
    let mac = mac_with(&mock, 2);

    assert!(mac.read_additional_status(&device()).await.unwrap().is_success());
    let stats = mac.statistics();
    assert_eq!(stats.timeouts, 2);
    assert_eq!(stats.attempts, 3);
}
