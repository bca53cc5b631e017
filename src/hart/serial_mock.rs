//! Mock physical layer for testing
//!
//! Simulates a HART modem with a single field device attached. Replies are
//! scripted up front; each one is placed on the receive line when the master
//! releases transmit enable, the point where a real device starts answering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::constants::{
    COMMAND_48, COMMAND_48_BYTE_COUNT, DEFAULT_PREAMBLE_LEN, DELIMITER_UNIQUE_ADDRESS,
    FRAME_TYPE_ACK, PREAMBLE_BYTE,
};
use crate::error::PhysError;
use crate::hart::frame::{checksum, Address};
use crate::hart::physical::PhysicalLayer;

/// What the simulated device does after one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Raw bytes on the line, preamble included
    Bytes(Vec<u8>),
    /// No answer at all
    Silence,
    /// The line hangs until [`MockPhysicalLayer::release`] is called
    Stall,
    /// The UART reports an error on the first byte
    Error(PhysError),
}

#[derive(Debug)]
enum RxEvent {
    Byte(u8),
    Error(PhysError),
    Stall,
}

#[derive(Debug, Default)]
struct MockState {
    tx: Vec<u8>,
    rx: VecDeque<RxEvent>,
    read_deadlines: Vec<Duration>,
    replies: VecDeque<Reply>,
    carrier: bool,
    transmitting: bool,
    enable_count: usize,
    transmit_count: usize,
    reset_count: usize,
}

/// Scripted modem. Clones share state, so a test keeps one clone for
/// inspection while the MAC owns another.
#[derive(Debug, Clone, Default)]
pub struct MockPhysicalLayer {
    state: Arc<Mutex<MockState>>,
    release: Arc<Notify>,
}

impl MockPhysicalLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the device's reply to the next unanswered request
    pub fn queue_reply(&self, reply: Reply) {
        self.state().replies.push_back(reply);
    }

    /// Queue a well-formed ACK to Command 48 from `address`
    pub fn queue_ack_response(&self, address: &Address, data: [u8; COMMAND_48_BYTE_COUNT]) {
        self.queue_reply(Reply::Bytes(ack_response_bytes(address, &data)));
    }

    /// Queue `count` unanswered requests
    pub fn queue_silence(&self, count: usize) {
        for _ in 0..count {
            self.queue_reply(Reply::Silence);
        }
    }

    pub fn set_carrier(&self, present: bool) {
        self.state().carrier = present;
    }

    /// Lets a stalled read return a timeout
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Data written to the line, preambles included
    pub fn tx_data(&self) -> Vec<u8> {
        self.state().tx.clone()
    }

    /// Deadline passed to every `read_byte` call, in order
    pub fn read_deadlines(&self) -> Vec<Duration> {
        self.state().read_deadlines.clone()
    }

    pub fn enable_count(&self) -> usize {
        self.state().enable_count
    }

    /// Number of completed transmissions
    pub fn transmit_count(&self) -> usize {
        self.state().transmit_count
    }

    pub fn reset_count(&self) -> usize {
        self.state().reset_count
    }

    pub fn is_transmitting(&self) -> bool {
        self.state().transmitting
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Raw bytes of a Command 48 ACK from `address`, with the default preamble.
pub fn ack_response_bytes(address: &Address, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![DELIMITER_UNIQUE_ADDRESS | FRAME_TYPE_ACK];
    frame.extend_from_slice(&address.to_bytes());
    frame.push(COMMAND_48);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    frame.push(checksum(&frame));

    let mut line = vec![PREAMBLE_BYTE; usize::from(DEFAULT_PREAMBLE_LEN)];
    line.extend(frame);
    line
}

#[async_trait::async_trait]
impl PhysicalLayer for MockPhysicalLayer {
    async fn enable_transmit(&mut self) -> Result<(), PhysError> {
        let mut state = self.state();
        state.enable_count += 1;
        state.transmitting = true;
        Ok(())
    }

    async fn disable_transmit(&mut self) -> Result<(), PhysError> {
        let mut state = self.state();
        state.transmitting = false;
        state.transmit_count += 1;

        let reply = state.replies.pop_front();
        match reply {
            Some(Reply::Bytes(bytes)) => state.rx.extend(bytes.into_iter().map(RxEvent::Byte)),
            Some(Reply::Error(error)) => state.rx.push_back(RxEvent::Error(error)),
            Some(Reply::Stall) => state.rx.push_back(RxEvent::Stall),
            Some(Reply::Silence) | None => {}
        }
        Ok(())
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), PhysError> {
        self.state().tx.push(byte);
        Ok(())
    }

    async fn read_byte(&mut self, deadline: Duration) -> Result<u8, PhysError> {
        let event = {
            let mut state = self.state();
            state.read_deadlines.push(deadline);
            state.rx.pop_front()
        };
        match event {
            Some(RxEvent::Byte(byte)) => Ok(byte),
            Some(RxEvent::Error(error)) => Err(error),
            Some(RxEvent::Stall) => {
                self.release.notified().await;
                Err(PhysError::Timeout)
            }
            None => Err(PhysError::Timeout),
        }
    }

    fn carrier_present(&mut self) -> bool {
        self.state().carrier
    }

    async fn reset(&mut self) {
        let mut state = self.state();
        state.reset_count += 1;
        state.transmitting = false;
        state.rx.clear();
    }
}
