//! CAN Transceiver Interface
//!
//! The physical and data-link layers (bit timing, arbitration, CRC) live in
//! an external controller driver. This module defines the frame type and the
//! narrow trait the OBD-II exchange needs from that driver.

use crate::error::DriverError;
use std::fmt;

/// Maximum payload of a classic CAN frame
pub const CAN_MAX_DLC: usize = 8;

const SFF_MASK: u32 = 0x0000_07FF;
const EFF_MASK: u32 = 0x1FFF_FFFF;

/// CAN arbitration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanId {
    /// 11-bit identifier
    Standard(u16),
    /// 29-bit identifier
    Extended(u32),
}

impl CanId {
    /// Build a standard identifier, masking to 11 bits
    pub fn standard(id: u16) -> Self {
        CanId::Standard(id & SFF_MASK as u16)
    }

    /// Build an extended identifier, masking to 29 bits
    pub fn extended(id: u32) -> Self {
        CanId::Extended(id & EFF_MASK)
    }

    pub fn as_raw(&self) -> u32 {
        match *self {
            CanId::Standard(id) => id as u32,
            CanId::Extended(id) => id,
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanId::Standard(id) => write!(f, "{:03X}", id),
            CanId::Extended(id) => write!(f, "{:08X}x", id),
        }
    }
}

/// A classic CAN data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: CanId,
    dlc: u8,
    data: [u8; CAN_MAX_DLC],
}

impl CanFrame {
    /// Create a frame carrying exactly `data`. Returns `None` for payloads
    /// longer than 8 bytes.
    pub fn new(id: CanId, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLC {
            return None;
        }
        let mut buf = [0u8; CAN_MAX_DLC];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            id,
            dlc: data.len() as u8,
            data: buf,
        })
    }

    /// Create a full 8-byte frame, zero padding after `data`. Bytes past
    /// the eighth are dropped.
    pub fn padded(id: CanId, data: &[u8]) -> Self {
        let len = data.len().min(CAN_MAX_DLC);
        let mut buf = [0u8; CAN_MAX_DLC];
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            dlc: CAN_MAX_DLC as u8,
            data: buf,
        }
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// Payload bytes actually carried by the frame
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.dlc)?;
        for b in self.data() {
            write!(f, " {:02X}", b)?;
        }
        Ok(())
    }
}

/// Driver for a CAN controller/transceiver pair.
///
/// All calls are non-blocking. The exchange owns the transceiver through
/// `&mut` for the duration of one request, so implementations need no
/// internal locking.
pub trait CanTransceiver: Send {
    /// Bring the controller onto the bus at `bitrate` bit/s
    fn open(&mut self, bitrate: u32) -> Result<(), DriverError>;

    /// Take the controller off the bus
    fn close(&mut self);

    /// Accept only frames carrying `id`
    fn set_filter(&mut self, id: CanId) -> Result<(), DriverError>;

    /// Queue one frame for transmission
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), DriverError>;

    /// Fetch the next received frame, `None` if nothing is pending
    fn poll(&mut self) -> Result<Option<CanFrame>, DriverError>;
}

impl<T: CanTransceiver + ?Sized> CanTransceiver for Box<T> {
    fn open(&mut self, bitrate: u32) -> Result<(), DriverError> {
        (**self).open(bitrate)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn set_filter(&mut self, id: CanId) -> Result<(), DriverError> {
        (**self).set_filter(id)
    }

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        (**self).transmit(frame)
    }

    fn poll(&mut self) -> Result<Option<CanFrame>, DriverError> {
        (**self).poll()
    }
}
