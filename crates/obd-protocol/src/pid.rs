//! OBD-II PID Requests, Responses and Supported-PID Bitmap

use serde::{Deserialize, Serialize};

/// Number of 32-bit words in the supported-PID bitmap
pub const SUPPORTED_PID_WORDS: usize = 32;

/// A single mode/PID query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PidRequest {
    /// Service / mode byte
    pub mode: u8,
    /// Parameter ID
    pub pid: u8,
}

impl PidRequest {
    pub fn new(mode: u8, pid: u8) -> Self {
        Self { mode, pid }
    }

    /// Mode byte a positive response echoes
    pub fn response_mode(&self) -> u8 {
        self.mode | 0x40
    }

    /// Request payload: additional-length byte, mode, pid
    pub fn payload(&self) -> [u8; 3] {
        [0x02, self.mode, self.pid]
    }
}

/// Caller-owned reply buffer.
///
/// Holds up to `capacity` bytes; the exchange records how many it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidResponse {
    buf: Vec<u8>,
    written: usize,
}

impl PidResponse {
    /// Allocate a response with room for `max_length` bytes
    pub fn with_capacity(max_length: usize) -> Self {
        Self {
            buf: vec![0; max_length],
            written: 0,
        }
    }

    /// Maximum number of bytes the exchange may write
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written by the last exchange
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.written]
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.written);
        self.buf
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub(crate) fn set_written(&mut self, written: usize) {
        self.written = written.min(self.buf.len());
    }
}

/// Which mode 01 PIDs the ECU reports as supported.
///
/// Word `n` holds the reply to PID `n * 0x20`; its most significant bit is
/// PID `n * 0x20 + 1` and its least significant bit announces whether the
/// next range exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedPids {
    words: [u32; SUPPORTED_PID_WORDS],
}

impl Default for SupportedPids {
    fn default() -> Self {
        Self {
            words: [0; SUPPORTED_PID_WORDS],
        }
    }
}

impl SupportedPids {
    pub fn clear(&mut self) {
        self.words = [0; SUPPORTED_PID_WORDS];
    }

    /// Store the 4-byte reply to range query `base_pid` (0x00, 0x20, ...)
    pub fn set_range(&mut self, base_pid: u8, reply: [u8; 4]) {
        self.words[(base_pid / 0x20) as usize] = u32::from_be_bytes(reply);
    }

    /// Raw word for range query `base_pid`
    pub fn range(&self, base_pid: u8) -> u32 {
        self.words[(base_pid / 0x20) as usize]
    }

    /// Whether the range following `base_pid` is announced
    pub fn has_next_range(&self, base_pid: u8) -> bool {
        self.range(base_pid) & 0x0000_0001 != 0
    }

    /// PID 0x00 is always supported
    pub fn is_supported(&self, pid: u8) -> bool {
        if pid == 0 {
            return true;
        }
        let index = (pid - 1) as usize;
        self.words[index / 32] & (1u32 << (31 - (index % 32))) != 0
    }

    pub fn words(&self) -> &[u32; SUPPORTED_PID_WORDS] {
        &self.words
    }
}
