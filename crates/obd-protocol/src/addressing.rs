//! OBD-II Addressing Schemes (ISO 15765-4)

use crate::can::CanId;
use serde::{Deserialize, Serialize};

/// Functional request identifier, 11-bit
pub const STANDARD_REQUEST_ID: u16 = 0x7DF;
/// Engine ECU reply identifier, 11-bit
pub const STANDARD_REPLY_ID: u16 = 0x7E8;
/// Functional request identifier, 29-bit
pub const EXTENDED_REQUEST_ID: u32 = 0x18DB_33F1;
/// Engine ECU reply identifier, 29-bit
pub const EXTENDED_REPLY_ID: u32 = 0x18DA_F110;

/// CAN identifier scheme the ECU answers diagnostics on.
///
/// Selected once by the negotiator and fixed afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressingMode {
    /// ISO 15765-4 CAN, 11-bit identifiers
    Standard11Bit,
    /// ISO 15765-4 CAN, 29-bit identifiers
    Extended29Bit,
}

impl AddressingMode {
    /// Probe order used during negotiation
    pub const PROBE_ORDER: [AddressingMode; 2] =
        [AddressingMode::Standard11Bit, AddressingMode::Extended29Bit];

    /// Identifier requests are transmitted on
    pub fn request_id(&self) -> CanId {
        match self {
            AddressingMode::Standard11Bit => CanId::standard(STANDARD_REQUEST_ID),
            AddressingMode::Extended29Bit => CanId::extended(EXTENDED_REQUEST_ID),
        }
    }

    /// Identifier the receive filter is set to
    pub fn reply_id(&self) -> CanId {
        match self {
            AddressingMode::Standard11Bit => CanId::standard(STANDARD_REPLY_ID),
            AddressingMode::Extended29Bit => CanId::extended(EXTENDED_REPLY_ID),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, AddressingMode::Extended29Bit)
    }
}
