//! OBD-II Error Types

use thiserror::Error;

/// Errors reported by a CAN transceiver driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Controller could not be brought up
    #[error("Driver initialization failed: {0}")]
    Init(String),

    /// Driver used before `open` or after `close`
    #[error("Driver not initialized")]
    NotInitialized,

    /// Frame was not acknowledged / could not be queued
    #[error("Transmit failed: {0}")]
    Transmit(String),

    /// Controller entered bus-off
    #[error("CAN bus off")]
    BusOff,

    #[error("Unknown driver error: {0}")]
    Unknown(String),
}

/// Errors that can occur during an OBD-II exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObdError {
    /// Every transmit attempt failed
    #[error("Transmit failed after {attempts} attempts")]
    TransmitExhausted { attempts: u8 },

    /// No matching frame before the deadline
    #[error("Timeout waiting for OBD response after {0}ms")]
    ResponseTimeout(u64),

    /// A reply matched but carried fewer bytes than the query needs
    #[error("Incomplete reply: expected {expected} bytes, got {received}")]
    IncompleteReply { expected: usize, received: usize },

    /// Neither 11-bit nor 29-bit addressing produced a valid reply
    #[error("ECU did not answer on standard or extended addressing")]
    NoAddressingAccepted,

    /// Bus operation attempted before `begin` succeeded
    #[error("OBD client not initialized")]
    NotInitialized,

    /// Transceiver error outside the retry policy (open, filter)
    #[error("CAN driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for ObdError {
    fn from(err: config::ConfigError) -> Self {
        ObdError::Config(err.to_string())
    }
}
