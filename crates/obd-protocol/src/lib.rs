//! OBD-II over CAN
//!
//! This crate queries engine ECUs for mode/PID data over a CAN transceiver.
//! It negotiates 11-bit or 29-bit addressing, reassembles segmented replies
//! with flow control, and tracks which PIDs the ECU advertises. Trouble-code
//! descriptions come from the `dtc-catalog` crate.

mod addressing;
mod can;
mod client;
mod config;
mod error;
mod exchange;
pub mod mock;
mod negotiator;
mod pid;
mod state;

pub use addressing::AddressingMode;
pub use can::{CanFrame, CanId, CanTransceiver, CAN_MAX_DLC};
pub use client::ObdClient;
pub use config::ObdConfig;
pub use error::{DriverError, ObdError};
pub use exchange::PidExchange;
pub use negotiator::{read_supported_pids, AddressingNegotiator};
pub use pid::{PidRequest, PidResponse, SupportedPids};
pub use state::{ExchangeState, TransferState};

pub use dtc_catalog::{CatalogError, Dtc, DtcClass};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}
