//! Exchange Timing and Bus Configuration

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the OBD-II client and exchange engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObdConfig {
    /// CAN bitrate in bit/s (default: 500000)
    pub bitrate: u32,
    /// Budget for each wait on an ECU frame (milliseconds)
    pub response_timeout_ms: u64,
    /// Minimum quiet time between a reply and the next request (milliseconds)
    pub min_request_spacing_ms: u64,
    /// Consecutive transmit attempts before giving up
    pub transmit_attempts: u8,
    /// Sleep between receive polls (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ObdConfig {
    fn default() -> Self {
        Self {
            bitrate: 500_000,
            response_timeout_ms: 200,
            min_request_spacing_ms: 60,
            transmit_attempts: 10,
            poll_interval_ms: 1,
        }
    }
}

impl ObdConfig {
    /// Load from an optional file, then apply `OBD_*` environment overrides
    /// (e.g. `OBD_RESPONSE_TIMEOUT_MS=500`).
    pub fn load(path: Option<&Path>) -> Result<Self, ObdError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("OBD").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
