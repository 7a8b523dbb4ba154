//! Scripted CAN Transceiver and Simulated ECU
//!
//! Lets the exchange run without hardware. [`MockTransceiver`] records every
//! transmitted frame and hands each one to an [`EcuResponder`], whose reply
//! frames are queued for `poll`. [`SimulatedEcu`] answers mode/PID queries
//! the way an engine ECU does.

use crate::addressing::AddressingMode;
use crate::can::{CanFrame, CanId, CanTransceiver};
use crate::error::DriverError;
use crate::state::{CONSECUTIVE_FRAME, FIRST_FRAME, FIRST_FRAME_DATA, FLOW_CONTROL_CONTINUE};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Produces reply frames for each transmitted frame
pub trait EcuResponder: Send {
    fn respond(&mut self, request: &CanFrame) -> Vec<CanFrame>;
}

impl<F> EcuResponder for F
where
    F: FnMut(&CanFrame) -> Vec<CanFrame> + Send,
{
    fn respond(&mut self, request: &CanFrame) -> Vec<CanFrame> {
        self(request)
    }
}

/// A frame the mock accepted for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    pub at: Instant,
    pub frame: CanFrame,
}

/// In-memory transceiver for tests and demos
pub struct MockTransceiver {
    bitrate: Option<u32>,
    filter: Option<CanId>,
    rx: VecDeque<CanFrame>,
    transmitted: Vec<TxRecord>,
    transmit_attempts: usize,
    failing_transmits: Option<usize>,
    /// Successful transmits left before every later one fails
    transmit_budget: Option<usize>,
    failing_polls: usize,
    fail_open: bool,
    responder: Option<Box<dyn EcuResponder>>,
}

impl Default for MockTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransceiver {
    /// A bus with nothing on it
    pub fn new() -> Self {
        Self {
            bitrate: None,
            filter: None,
            rx: VecDeque::new(),
            transmitted: Vec::new(),
            transmit_attempts: 0,
            failing_transmits: Some(0),
            transmit_budget: None,
            failing_polls: 0,
            fail_open: false,
            responder: None,
        }
    }

    pub fn with_responder(responder: impl EcuResponder + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// Queue a frame as if it had arrived from the bus
    pub fn push_rx(&mut self, frame: CanFrame) {
        self.rx.push_back(frame);
    }

    /// Fail the next `count` transmit calls
    pub fn fail_next_transmits(&mut self, count: usize) {
        self.failing_transmits = Some(count);
    }

    /// Fail every transmit call
    pub fn fail_all_transmits(&mut self) {
        self.failing_transmits = None;
    }

    /// Let `successes` transmits through, then fail every one after
    pub fn fail_transmits_after(&mut self, successes: usize) {
        self.transmit_budget = Some(successes);
    }

    /// Make the next `count` poll calls return a driver error
    pub fn fail_next_polls(&mut self, count: usize) {
        self.failing_polls = count;
    }

    pub fn fail_open(&mut self) {
        self.fail_open = true;
    }

    /// Frames that were successfully transmitted, in order
    pub fn transmitted(&self) -> &[TxRecord] {
        &self.transmitted
    }

    /// Transmit calls, successful or not
    pub fn transmit_attempts(&self) -> usize {
        self.transmit_attempts
    }

    /// Frames queued and not yet polled
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn filter(&self) -> Option<CanId> {
        self.filter
    }

    pub fn is_open(&self) -> bool {
        self.bitrate.is_some()
    }

    pub fn bitrate(&self) -> Option<u32> {
        self.bitrate
    }
}

impl CanTransceiver for MockTransceiver {
    fn open(&mut self, bitrate: u32) -> Result<(), DriverError> {
        if self.fail_open {
            return Err(DriverError::Init("mock open failure".to_string()));
        }
        self.bitrate = Some(bitrate);
        Ok(())
    }

    fn close(&mut self) {
        self.bitrate = None;
        self.filter = None;
        self.rx.clear();
    }

    fn set_filter(&mut self, id: CanId) -> Result<(), DriverError> {
        self.filter = Some(id);
        Ok(())
    }

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        self.transmit_attempts += 1;
        match self.failing_transmits.as_mut() {
            None => return Err(DriverError::Transmit("no acknowledgement".to_string())),
            Some(n) if *n > 0 => {
                *n -= 1;
                return Err(DriverError::Transmit("no acknowledgement".to_string()));
            }
            Some(_) => {}
        }
        match self.transmit_budget.as_mut() {
            Some(n) if *n == 0 => {
                return Err(DriverError::Transmit("no acknowledgement".to_string()));
            }
            Some(n) => *n -= 1,
            None => {}
        }

        self.transmitted.push(TxRecord {
            at: Instant::now(),
            frame: *frame,
        });
        if let Some(responder) = self.responder.as_mut() {
            self.rx.extend(responder.respond(frame));
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<CanFrame>, DriverError> {
        if self.failing_polls > 0 {
            self.failing_polls -= 1;
            return Err(DriverError::Unknown("mock receive fault".to_string()));
        }
        // hardware filter: frames for other identifiers never surface
        while let Some(frame) = self.rx.pop_front() {
            match self.filter {
                Some(id) if frame.id() != id => continue,
                _ => return Ok(Some(frame)),
            }
        }
        Ok(None)
    }
}

/// Engine ECU answering on one addressing scheme.
///
/// Replies that fit one frame are sent as single frames; longer ones as a
/// first frame carrying three data bytes followed by one consecutive frame
/// per flow-control request.
#[derive(Debug, Clone)]
pub struct SimulatedEcu {
    addressing: AddressingMode,
    values: HashMap<(u8, u8), Vec<u8>>,
    pending: VecDeque<CanFrame>,
    /// Clear-DTC requests seen, shared with `clear_requests` handles
    cleared: Arc<AtomicUsize>,
}

impl SimulatedEcu {
    pub fn new(addressing: AddressingMode) -> Self {
        Self {
            addressing,
            values: HashMap::new(),
            pending: VecDeque::new(),
            cleared: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer mode/PID with `value` (bytes after the mode and PID echo)
    pub fn with_value(mut self, mode: u8, pid: u8, value: &[u8]) -> Self {
        self.values.insert((mode, pid), value.to_vec());
        self
    }

    /// Answer the mode 01 supported-PID range queries with `words`,
    /// starting at PID 0x00
    pub fn with_supported_pids(mut self, words: &[u32]) -> Self {
        for (i, word) in words.iter().enumerate() {
            let pid = (i * 0x20) as u8;
            self.values.insert((0x01, pid), word.to_be_bytes().to_vec());
        }
        self
    }

    /// Handle counting the clear-DTC requests this ECU has seen
    pub fn clear_requests(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.cleared)
    }

    fn reply(&self, data: &[u8]) -> CanFrame {
        CanFrame::padded(self.addressing.reply_id(), data)
    }

    fn answer(&mut self, mode: u8, pid: u8) -> Vec<CanFrame> {
        let Some(value) = self.values.get(&(mode, pid)).cloned() else {
            return vec![self.reply(&[0x03, 0x7F, mode, 0x12])];
        };

        let total = value.len() + 2;
        if total <= 7 {
            let mut data = vec![total as u8, mode | 0x40, pid];
            data.extend_from_slice(&value);
            return vec![self.reply(&data)];
        }

        let head = FIRST_FRAME_DATA.min(value.len());
        let mut first = vec![
            FIRST_FRAME | ((total >> 8) & 0x0F) as u8,
            (total & 0xFF) as u8,
            mode | 0x40,
            pid,
        ];
        first.extend_from_slice(&value[..head]);

        self.pending.clear();
        let mut sequence = 1u8;
        for chunk in value[head..].chunks(7) {
            let mut data = vec![CONSECUTIVE_FRAME | sequence];
            data.extend_from_slice(chunk);
            self.pending.push_back(self.reply(&data));
            sequence = (sequence + 1) & 0x0F;
        }

        let id = self.addressing.reply_id();
        CanFrame::new(id, &first).into_iter().collect()
    }
}

impl EcuResponder for SimulatedEcu {
    fn respond(&mut self, request: &CanFrame) -> Vec<CanFrame> {
        if request.id() != self.addressing.request_id() {
            return Vec::new();
        }

        match request.data() {
            [FLOW_CONTROL_CONTINUE, ..] => self.pending.pop_front().into_iter().collect(),
            [0x02, mode, pid, ..] => self.answer(*mode, *pid),
            [0x00, 0x04, ..] => {
                debug!("Simulated ECU clearing trouble codes");
                self.cleared.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
