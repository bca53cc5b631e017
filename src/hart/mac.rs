//! # Master MAC State Machine
//!
//! Drives one Command 48 request/response exchange at a time on behalf of a
//! secondary master.
//!
//! ```text
//! Idle -> AwaitingEnable -> Transmitting -> AwaitingResponse -> Resolved -> Idle
//!              ^                                   |
//!              +------------ Retrying <------------+
//! ```
//!
//! A transaction is claimed atomically; a second request while one is in
//! flight fails with [`HartError::Busy`] before the physical layer is
//! touched. Timeouts, corrupted responses and physical errors are retried up
//! to [`MacConfig::max_retries`] times with the same frame. [`MasterMac::reset`]
//! abandons an in-flight transaction, which then resolves to
//! [`FailureReason::Reset`]. Dropping a pending `transmit_request` future
//! returns the MAC to `Idle`.

use std::fmt;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::constants::{
    CHARACTER_TIME_US, COMMAND_48, COMMAND_48_BYTE_COUNT, COMMAND_48_FRAME_LEN,
    DEFAULT_MAX_RETRIES, DEFAULT_PREAMBLE_LEN, DELIMITER_EXPANSION_MASK,
    DELIMITER_UNIQUE_ADDRESS, MAX_PREAMBLE_LEN, MIN_PREAMBLE_LEN, PREAMBLE_BYTE, RT1_CHARS,
    RT2_CHARS, UNIQUE_ADDRESS_LEN,
};
use crate::error::{FrameError, HartError, PhysError};
use crate::hart::diagnostics::{Command48Response, DeviceDiagnostics};
use crate::hart::frame::{self, Address, Frame, FrameType};
use crate::hart::physical::PhysicalLayer;
use crate::util::bits::{field, test_mask};
use crate::util::logging::{log_frame_hex, log_frame_structured};

/// Upper bound on bytes discarded while resynchronising after a bad reply.
const MAX_DRAIN_BYTES: usize = 256;

/// Timing and retry parameters of the master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacConfig {
    /// Retries after the first attempt
    pub max_retries: u8,
    /// Number of 0xFF bytes sent ahead of each frame
    pub preamble_length: u8,
    pub character_time_us: u64,
    /// First response window, in character times
    pub response_timeout_chars: u32,
    /// Gap allowed between two received bytes, in character times
    pub inter_byte_timeout_chars: u32,
    /// Refuse to transmit while another station holds the carrier
    pub check_carrier: bool,
}

impl Default for MacConfig {
    fn default() -> Self {
        MacConfig {
            max_retries: DEFAULT_MAX_RETRIES,
            preamble_length: DEFAULT_PREAMBLE_LEN,
            character_time_us: CHARACTER_TIME_US,
            response_timeout_chars: RT1_CHARS,
            inter_byte_timeout_chars: RT2_CHARS,
            check_carrier: true,
        }
    }
}

impl MacConfig {
    pub fn response_timeout(&self) -> Duration {
        self.character_times(self.response_timeout_chars)
    }

    pub fn inter_byte_timeout(&self) -> Duration {
        self.character_times(self.inter_byte_timeout_chars)
    }

    /// Total transmit attempts, the first one included.
    pub fn max_attempts(&self) -> u16 {
        u16::from(self.max_retries) + 1
    }

    fn character_times(&self, chars: u32) -> Duration {
        Duration::from_micros(self.character_time_us.saturating_mul(u64::from(chars)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacState {
    Idle,
    AwaitingEnable,
    Transmitting,
    AwaitingResponse,
    Retrying,
    Resolved,
}

impl MacState {
    /// Whether the machine may move from `self` to `next`.
    ///
    /// Any state may fall back to `Idle` on reset or cancellation.
    pub fn can_transition_to(self, next: MacState) -> bool {
        use MacState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle, AwaitingEnable) => true,
            (AwaitingEnable, Transmitting) | (AwaitingEnable, Retrying) => true,
            (Transmitting, AwaitingResponse) | (Transmitting, Retrying) => true,
            (AwaitingResponse, Resolved) | (AwaitingResponse, Retrying) => true,
            (Retrying, AwaitingEnable) | (Retrying, Resolved) => true,
            (Idle, _)
            | (AwaitingEnable, _)
            | (Transmitting, _)
            | (AwaitingResponse, _)
            | (Retrying, _)
            | (Resolved, _) => false,
        }
    }
}

impl fmt::Display for MacState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MacState::Idle => "Idle",
            MacState::AwaitingEnable => "AwaitingEnable",
            MacState::Transmitting => "Transmitting",
            MacState::AwaitingResponse => "AwaitingResponse",
            MacState::Retrying => "Retrying",
            MacState::Resolved => "Resolved",
        };
        f.write_str(name)
    }
}

/// Why a single attempt failed. Every cause is retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetryCause {
    #[error("no response within deadline")]
    Timeout,

    #[error("{0}")]
    Frame(#[from] FrameError),

    #[error("physical layer: {0}")]
    Phys(PhysError),

    #[error("carrier detected, channel busy")]
    CarrierDetected,

    #[error("response from {received}, expected {expected}")]
    AddressMismatch { expected: Address, received: Address },

    #[error("unexpected {0} frame in response")]
    UnexpectedFrameType(FrameType),
}

impl From<PhysError> for RetryCause {
    fn from(error: PhysError) -> Self {
        match error {
            PhysError::Timeout => RetryCause::Timeout,
            other => RetryCause::Phys(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    RetriesExhausted { attempts: u16, last_cause: RetryCause },
    Reset,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted {
                attempts,
                last_cause,
            } => write!(f, "no valid response after {attempts} attempts ({last_cause})"),
            FailureReason::Reset => f.write_str("transaction abandoned by reset"),
        }
    }
}

/// Outcome of one exchange. A failure never carries diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    Success(Command48Response),
    CommunicationFailure(FailureReason),
}

impl TransactionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransactionResult::Success(_))
    }

    pub fn response(&self) -> Option<&Command48Response> {
        match self {
            TransactionResult::Success(response) => Some(response),
            TransactionResult::CommunicationFailure(_) => None,
        }
    }

    pub fn diagnostics(&self) -> Option<DeviceDiagnostics> {
        self.response().map(Command48Response::diagnostics)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TransactionResult::Success(_) => None,
            TransactionResult::CommunicationFailure(reason) => Some(reason),
        }
    }
}

/// Link counters, cumulative since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacStatistics {
    pub transactions: u64,
    pub successes: u64,
    pub failures: u64,
    pub attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub checksum_errors: u64,
    pub malformed_frames: u64,
    pub phys_errors: u64,
    pub resets: u64,
}

#[derive(Debug)]
struct Slot {
    state: MacState,
    active: Option<u64>,
    next_id: u64,
}

/// Secondary master medium access control.
pub struct MasterMac<P: PhysicalLayer> {
    phys: Mutex<P>,
    slot: StdMutex<Slot>,
    stats: StdMutex<MacStatistics>,
    reset_tx: watch::Sender<u64>,
    config: MacConfig,
}

impl<P: PhysicalLayer> MasterMac<P> {
    pub fn new(phys: P, config: MacConfig) -> Self {
        let (reset_tx, _) = watch::channel(0);
        MasterMac {
            phys: Mutex::new(phys),
            slot: StdMutex::new(Slot {
                state: MacState::Idle,
                active: None,
                next_id: 0,
            }),
            stats: StdMutex::new(MacStatistics::default()),
            reset_tx,
            config,
        }
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    pub fn state(&self) -> MacState {
        self.slot().state
    }

    pub fn statistics(&self) -> MacStatistics {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues Command 48 (Read Additional Device Status) to `address`.
    pub async fn read_additional_status(
        &self,
        address: &Address,
    ) -> Result<TransactionResult, HartError> {
        self.transmit_request(address, COMMAND_48, &[0u8; COMMAND_48_BYTE_COUNT])
            .await
    }

    /// Runs one request/response transaction to completion.
    ///
    /// `Err` is returned only for failures detected before any I/O: an
    /// invalid request or [`HartError::Busy`]. Everything that happens on
    /// the wire resolves to a [`TransactionResult`].
    pub async fn transmit_request(
        &self,
        address: &Address,
        command: u8,
        data: &[u8],
    ) -> Result<TransactionResult, HartError> {
        let frame = frame::encode(address, command, data)?;

        let mut reset_rx = self.reset_tx.subscribe();
        let id = self.claim()?;
        let _guard = TransactionGuard { mac: self, id };
        self.record(|stats| stats.transactions += 1);
        debug!("transaction {id}: Idle -> AwaitingEnable ({address}, command {command})");

        let result = tokio::select! {
            biased;
            _ = reset_rx.changed() => {
                error!("transaction {id} abandoned by reset");
                TransactionResult::CommunicationFailure(FailureReason::Reset)
            }
            result = self.run(&frame, address, id) => result,
        };

        if !result.is_success() {
            self.record(|stats| stats.failures += 1);
        }
        Ok(result)
    }

    /// Abandons any in-flight transaction and resets the physical layer.
    pub async fn reset(&self) {
        self.reset_tx
            .send_modify(|generation| *generation = generation.wrapping_add(1));
        {
            let mut slot = self.slot();
            if let Some(id) = slot.active.take() {
                warn!("reset while transaction {id} in {}", slot.state);
            }
            slot.state = MacState::Idle;
        }
        self.record(|stats| stats.resets += 1);

        self.phys.lock().await.reset().await;
        debug!("physical layer reset, MAC Idle");
    }

    async fn run(&self, frame: &Frame, address: &Address, id: u64) -> TransactionResult {
        let mut phys = self.phys.lock().await;
        let mut attempt: u16 = 1;

        loop {
            self.record(|stats| stats.attempts += 1);

            match self.attempt(&mut *phys, frame, address, id).await {
                Ok(response) => {
                    self.transition(id, MacState::Resolved);
                    self.record(|stats| stats.successes += 1);
                    info!("{address} answered command 48 on attempt {attempt}");
                    return TransactionResult::Success(response);
                }
                Err(cause) => {
                    self.transition(id, MacState::Retrying);
                    self.count_cause(&cause);

                    if attempt >= self.config.max_attempts() {
                        self.transition(id, MacState::Resolved);
                        let reason = FailureReason::RetriesExhausted {
                            attempts: attempt,
                            last_cause: cause,
                        };
                        error!("{address}: {reason}");
                        return TransactionResult::CommunicationFailure(reason);
                    }

                    warn!(
                        "attempt {attempt}/{} to {address} failed: {cause}",
                        self.config.max_attempts()
                    );
                    self.record(|stats| stats.retries += 1);
                    attempt += 1;
                    self.transition(id, MacState::AwaitingEnable);
                }
            }
        }
    }

    async fn attempt(
        &self,
        phys: &mut P,
        frame: &Frame,
        address: &Address,
        id: u64,
    ) -> Result<Command48Response, RetryCause> {
        if self.config.check_carrier && phys.carrier_present() {
            return Err(RetryCause::CarrierDetected);
        }
        phys.enable_transmit().await?;
        self.transition(id, MacState::Transmitting);

        let sent = self.send(phys, frame).await;
        let released = phys.disable_transmit().await;
        sent?;
        released?;
        self.transition(id, MacState::AwaitingResponse);

        let outcome = match self.receive_frame(phys).await {
            Ok(bytes) => self.accept(&bytes, address),
            Err(cause) => Err(cause),
        };
        if outcome.is_err() {
            self.drain(phys).await;
        }
        outcome
    }

    async fn send(&self, phys: &mut P, frame: &Frame) -> Result<(), PhysError> {
        let preamble = vec![PREAMBLE_BYTE; usize::from(self.config.preamble_length)];
        phys.write_all(&preamble).await?;
        phys.write_all(frame.as_bytes()).await?;
        log_frame_hex("tx", frame.as_bytes());
        Ok(())
    }

    /// Reads one frame off the line. Noise ahead of the preamble is skipped;
    /// a delimiter counts only after `MIN_PREAMBLE_LEN` preamble bytes.
    async fn receive_frame(&self, phys: &mut P) -> Result<Vec<u8>, RetryCause> {
        let gap = self.config.inter_byte_timeout();

        let mut byte = phys.read_byte(self.config.response_timeout()).await?;
        let mut preamble = 0usize;
        let mut noise = 0usize;
        loop {
            if byte == PREAMBLE_BYTE {
                preamble += 1;
                if preamble > MAX_PREAMBLE_LEN + 2 {
                    return Err(FrameError::MalformedFrame(format!(
                        "preamble longer than {MAX_PREAMBLE_LEN} bytes"
                    ))
                    .into());
                }
            } else if preamble >= MIN_PREAMBLE_LEN {
                break;
            } else {
                noise += 1;
                if noise > MAX_PREAMBLE_LEN {
                    return Err(FrameError::MalformedFrame(format!(
                        "no preamble within {noise} bytes"
                    ))
                    .into());
                }
                preamble = 0;
            }
            byte = phys.read_byte(gap).await?;
        }
        if noise > 0 {
            debug!("skipped {noise} noise bytes before preamble");
        }

        let delimiter = byte;
        let address_len = if test_mask(delimiter, DELIMITER_UNIQUE_ADDRESS) {
            UNIQUE_ADDRESS_LEN
        } else {
            1
        };
        let expansion = usize::from(field(delimiter, DELIMITER_EXPANSION_MASK));

        let mut buf = Vec::with_capacity(COMMAND_48_FRAME_LEN);
        buf.push(delimiter);
        // address, expansion bytes, command and byte count
        read_exact(phys, &mut buf, address_len + expansion + 2, gap).await?;
        let byte_count = usize::from(buf[buf.len() - 1]);
        read_exact(phys, &mut buf, byte_count + 1, gap).await?;

        Ok(buf)
    }

    fn accept(&self, bytes: &[u8], address: &Address) -> Result<Command48Response, RetryCause> {
        let frame = Frame::parse(bytes)?;
        log_frame_structured(
            "rx",
            frame.as_bytes(),
            Some(frame.frame_type().name()),
            Some(frame.command()),
        );

        if frame.frame_type() != FrameType::Ack {
            return Err(RetryCause::UnexpectedFrameType(frame.frame_type()));
        }
        if !frame.address().same_device(address) {
            return Err(RetryCause::AddressMismatch {
                expected: *address,
                received: *frame.address(),
            });
        }
        Ok(Command48Response::from_frame(&frame)?)
    }

    /// Discards bytes until the line stays quiet for one inter-byte gap.
    async fn drain(&self, phys: &mut P) {
        let gap = self.config.inter_byte_timeout();
        let mut discarded = 0usize;
        while discarded < MAX_DRAIN_BYTES && phys.read_byte(gap).await.is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("drained {discarded} stale bytes");
        }
    }

    fn claim(&self) -> Result<u64, HartError> {
        let mut slot = self.slot();
        if slot.state != MacState::Idle {
            debug!("request rejected, MAC in {}", slot.state);
            return Err(HartError::Busy);
        }
        slot.next_id = slot.next_id.wrapping_add(1);
        let id = slot.next_id;
        slot.active = Some(id);
        slot.state = MacState::AwaitingEnable;
        Ok(id)
    }

    /// Moves transaction `id` to `next`. Ignored once the transaction has
    /// been abandoned by a reset.
    fn transition(&self, id: u64, next: MacState) {
        let mut slot = self.slot();
        if slot.active != Some(id) {
            return;
        }
        if !slot.state.can_transition_to(next) {
            error!("invalid MAC transition {} -> {next}", slot.state);
            return;
        }
        debug!("transaction {id}: {} -> {next}", slot.state);
        slot.state = next;
    }

    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.active == Some(id) {
            debug!("transaction {id}: {} -> Idle", slot.state);
            slot.active = None;
            slot.state = MacState::Idle;
        }
    }

    fn count_cause(&self, cause: &RetryCause) {
        self.record(|stats| match cause {
            RetryCause::Timeout => stats.timeouts += 1,
            RetryCause::Frame(FrameError::ChecksumMismatch { .. }) => stats.checksum_errors += 1,
            RetryCause::Frame(_) => stats.malformed_frames += 1,
            RetryCause::Phys(_) => stats.phys_errors += 1,
            RetryCause::CarrierDetected
            | RetryCause::AddressMismatch { .. }
            | RetryCause::UnexpectedFrameType(_) => {}
        });
    }

    fn record(&self, update: impl FnOnce(&mut MacStatistics)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the MAC to `Idle` when a transaction completes or its future is
/// dropped.
struct TransactionGuard<'a, P: PhysicalLayer> {
    mac: &'a MasterMac<P>,
    id: u64,
}

impl<P: PhysicalLayer> Drop for TransactionGuard<'_, P> {
    fn drop(&mut self) {
        self.mac.release(self.id);
    }
}

/// Appends `count` bytes to `buf`. A gap inside a frame is a truncation,
/// not a missing response.
async fn read_exact<P: PhysicalLayer>(
    phys: &mut P,
    buf: &mut Vec<u8>,
    count: usize,
    gap: Duration,
) -> Result<(), RetryCause> {
    for _ in 0..count {
        match phys.read_byte(gap).await {
            Ok(byte) => buf.push(byte),
            Err(PhysError::Timeout) => {
                return Err(FrameError::MalformedFrame(format!(
                    "response truncated after {} bytes",
                    buf.len()
                ))
                .into())
            }
            Err(other) => return Err(RetryCause::Phys(other)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::frame::MasterAddress;
    use crate::hart::serial_mock::{MockPhysicalLayer, Reply};

    fn device() -> Address {
        Address::new(MasterAddress::Secondary, false, 0x002B, 0x12_3456).unwrap()
    }

    #[test]
    fn test_default_timing() {
        let config = MacConfig::default();
        assert_eq!(config.response_timeout(), Duration::from_micros(41 * 9_167));
        assert_eq!(config.inter_byte_timeout(), Duration::from_micros(8 * 9_167));
        assert_eq!(config.max_attempts(), 3);
    }

    #[test]
    fn test_transition_table() {
        use MacState::*;
        assert!(Idle.can_transition_to(AwaitingEnable));
        assert!(AwaitingResponse.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(AwaitingEnable));
        assert!(Resolved.can_transition_to(Idle));
        assert!(Transmitting.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Transmitting));
        assert!(!AwaitingEnable.can_transition_to(AwaitingResponse));
        assert!(!Resolved.can_transition_to(AwaitingEnable));
    }

    #[test]
    fn test_phys_timeout_maps_to_timeout_cause() {
        assert_eq!(RetryCause::from(PhysError::Timeout), RetryCause::Timeout);
        assert_eq!(
            RetryCause::from(PhysError::Parity),
            RetryCause::Phys(PhysError::Parity)
        );
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let mock = MockPhysicalLayer::new();
        mock.queue_ack_response(&device(), [0, 0x10, 0, 0, 0, 0, 0x02, 0]);
        let mac = MasterMac::new(mock.clone(), MacConfig::default());

        let result = mac.read_additional_status(&device()).await.unwrap();
        let diagnostics = result.diagnostics().unwrap();
        assert!(diagnostics.config_corrupt);
        assert!(diagnostics.device_variable_alert);
        assert_eq!(mac.state(), MacState::Idle);
        assert_eq!(mock.transmit_count(), 1);

        let stats = mac.statistics();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn test_preamble_and_frame_written() {
        let mock = MockPhysicalLayer::new();
        mock.queue_reply(Reply::Silence);
        let config = MacConfig {
            max_retries: 0,
            preamble_length: 7,
            ..MacConfig::default()
        };
        let mac = MasterMac::new(mock.clone(), config);

        mac.read_additional_status(&device()).await.unwrap();
        let tx = mock.tx_data();
        assert_eq!(tx.len(), 7 + COMMAND_48_FRAME_LEN);
        assert!(tx[..7].iter().all(|&b| b == PREAMBLE_BYTE));
        assert_eq!(tx[7], 0x82);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_io() {
        let mock = MockPhysicalLayer::new();
        let mac = MasterMac::new(mock.clone(), MacConfig::default());

        let err = mac
            .transmit_request(&device(), COMMAND_48, &[0u8; 4])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HartError::Frame(FrameError::InvalidPayloadLength { .. })
        ));
        assert_eq!(mock.enable_count(), 0);
        assert_eq!(mac.state(), MacState::Idle);
    }
}
