//! Reply State Machine
//!
//! Pure transitions for one PID exchange. The async driver in `exchange`
//! feeds received payloads in; nothing here touches the bus or the clock.

use crate::error::ObdError;
use crate::pid::PidRequest;

/// ISO-TP first-frame PCI
pub const FIRST_FRAME: u8 = 0x10;
/// ISO-TP consecutive-frame PCI (low nibble carries the sequence)
pub const CONSECUTIVE_FRAME: u8 = 0x20;
/// ISO-TP flow control, clear to send
pub const FLOW_CONTROL_CONTINUE: u8 = 0x30;

/// Data bytes a single-frame reply carries after length, mode and pid
pub const SINGLE_FRAME_MAX_DATA: usize = 5;
/// Data bytes taken from a first frame after its 4 header bytes
pub const FIRST_FRAME_DATA: usize = 3;

const SINGLE_HEADER_LEN: usize = 3;
const FIRST_HEADER_LEN: usize = 4;

/// Progress of a segmented reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    /// Bytes written to the caller's buffer so far
    pub bytes_received: usize,
    /// Sequence nibble (0-15) the next consecutive frame must carry
    pub next_sequence: u8,
    /// Bytes the caller asked for
    pub total_expected: usize,
}

impl TransferState {
    fn new(bytes_received: usize, total_expected: usize) -> Self {
        Self {
            bytes_received,
            next_sequence: 1,
            total_expected,
        }
    }

    /// First byte the next consecutive frame must carry
    pub fn expected_pci(&self) -> u8 {
        CONSECUTIVE_FRAME | (self.next_sequence & 0x0F)
    }

    fn advance(mut self, written: usize) -> ExchangeState {
        self.bytes_received += written;
        self.next_sequence = (self.next_sequence + 1) & 0x0F;
        if self.bytes_received >= self.total_expected {
            ExchangeState::Complete(self.bytes_received)
        } else {
            ExchangeState::AwaitingConsecutiveFrame(self)
        }
    }
}

/// Where an exchange stands after the request went out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    /// Waiting for a single-frame reply or a first frame
    AwaitingFirstFrame,
    /// Flow control sent (or about to be); waiting for a consecutive frame
    AwaitingConsecutiveFrame(TransferState),
    /// Reply assembled, value is the number of bytes written
    Complete(usize),
    Failed(ObdError),
}

impl ExchangeState {
    /// Whether a reply of `max_length` bytes needs a segmented transfer
    pub fn is_multi_frame(max_length: usize) -> bool {
        max_length > SINGLE_FRAME_MAX_DATA
    }

    /// Feed one received payload.
    ///
    /// Returns `None` when the frame does not belong to this exchange; the
    /// caller discards it and keeps polling in the current state.
    pub fn on_frame(&self, request: &PidRequest, frame: &[u8], out: &mut [u8]) -> Option<Self> {
        match self {
            ExchangeState::AwaitingFirstFrame => Self::on_reply(request, frame, out),
            ExchangeState::AwaitingConsecutiveFrame(transfer) => {
                Self::on_consecutive(*transfer, frame, out)
            }
            ExchangeState::Complete(_) | ExchangeState::Failed(_) => None,
        }
    }

    /// No matching frame arrived within the wait budget
    pub fn on_timeout(&self, waited_ms: u64) -> Self {
        match self {
            ExchangeState::AwaitingFirstFrame | ExchangeState::AwaitingConsecutiveFrame(_) => {
                ExchangeState::Failed(ObdError::ResponseTimeout(waited_ms))
            }
            terminal => terminal.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Complete(_) | ExchangeState::Failed(_))
    }

    fn on_reply(request: &PidRequest, frame: &[u8], out: &mut [u8]) -> Option<Self> {
        if Self::is_multi_frame(out.len()) {
            if frame.len() < FIRST_HEADER_LEN
                || frame[0] != FIRST_FRAME
                || frame[1] == 0
                || frame[2] != request.response_mode()
                || frame[3] != request.pid
            {
                return None;
            }

            let written = copy_into(&frame[FIRST_HEADER_LEN..], out, 0, FIRST_FRAME_DATA);
            let transfer = TransferState::new(written, out.len());
            if transfer.bytes_received >= transfer.total_expected {
                return Some(ExchangeState::Complete(written));
            }
            Some(ExchangeState::AwaitingConsecutiveFrame(transfer))
        } else {
            // length byte is not checked for single-frame replies
            if frame.len() < SINGLE_HEADER_LEN
                || frame[1] != request.response_mode()
                || frame[2] != request.pid
            {
                return None;
            }

            let written = copy_into(&frame[SINGLE_HEADER_LEN..], out, 0, out.len());
            Some(ExchangeState::Complete(written))
        }
    }

    fn on_consecutive(transfer: TransferState, frame: &[u8], out: &mut [u8]) -> Option<Self> {
        if frame.first() != Some(&transfer.expected_pci()) {
            return None;
        }
        let remaining = transfer.total_expected - transfer.bytes_received;
        let written = copy_into(&frame[1..], out, transfer.bytes_received, remaining);
        Some(transfer.advance(written))
    }
}

/// Copy at most `limit` bytes of `src` into `out[offset..]`
fn copy_into(src: &[u8], out: &mut [u8], offset: usize, limit: usize) -> usize {
    let room = out.len().saturating_sub(offset);
    let n = src.len().min(limit).min(room);
    out[offset..offset + n].copy_from_slice(&src[..n]);
    n
}
