//! OBD-II Client over CAN
//!
//! Owns a [`CanTransceiver`] and the exchange state for it. `begin` brings
//! the bus up and settles on an addressing scheme; every other bus
//! operation requires that to have succeeded.

use crate::addressing::AddressingMode;
use crate::can::CanTransceiver;
use crate::config::ObdConfig;
use crate::error::ObdError;
use crate::exchange::PidExchange;
use crate::mock::{MockTransceiver, SimulatedEcu};
use crate::mode;
use crate::negotiator::AddressingNegotiator;
use crate::pid::{PidRequest, PidResponse, SupportedPids};
use dtc_catalog::CatalogError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Clear-DTC request: no PID byte follows the mode
const CLEAR_DTC_PAYLOAD: [u8; 2] = [0x00, mode::CLEAR_DTC];

/// OBD-II client for one CAN bus
pub struct ObdClient<T: CanTransceiver> {
    transceiver: T,
    exchange: PidExchange,
    /// Bitmap from the last successful negotiation
    supported: SupportedPids,
    /// Set once `begin` succeeds, cleared by `end`
    addressing: Option<AddressingMode>,
}

impl<T: CanTransceiver> ObdClient<T> {
    pub fn new(transceiver: T, config: ObdConfig) -> Self {
        Self {
            transceiver,
            exchange: PidExchange::new(AddressingMode::Standard11Bit, config),
            supported: SupportedPids::default(),
            addressing: None,
        }
    }

    /// Open the bus and negotiate addressing.
    ///
    /// The transceiver is closed again if no scheme is accepted.
    pub async fn begin(&mut self) -> Result<AddressingMode, ObdError> {
        let bitrate = self.exchange.config().bitrate;
        info!("Opening CAN bus at {} bit/s", bitrate);

        self.addressing = None;
        self.transceiver.open(bitrate)?;

        match AddressingNegotiator
            .negotiate(&mut self.exchange, &mut self.transceiver, &mut self.supported)
            .await
        {
            Ok(addressing) => {
                info!("OBD client ready on {:?} addressing", addressing);
                self.addressing = Some(addressing);
                Ok(addressing)
            }
            Err(e) => {
                warn!("OBD initialization failed: {}", e);
                self.transceiver.close();
                Err(e)
            }
        }
    }

    /// Close the bus
    pub fn end(&mut self) {
        if self.addressing.take().is_some() {
            info!("Closing OBD client");
        }
        self.transceiver.close();
    }

    /// Ask every ECU to clear its stored trouble codes.
    ///
    /// Returns once the request is on the bus; ECUs do not acknowledge it.
    pub async fn clear_all_stored_dtc(&mut self) -> Result<(), ObdError> {
        self.ensure_initialized()?;
        info!("Clearing stored trouble codes");
        self.exchange
            .send(&mut self.transceiver, &CLEAR_DTC_PAYLOAD)
            .await
    }

    /// Read up to `length` bytes of mode/PID data
    pub async fn read_pid_raw(
        &mut self,
        mode: u8,
        pid: u8,
        length: usize,
    ) -> Result<PidResponse, ObdError> {
        self.read_pid_raw_until(mode, pid, length, None).await
    }

    /// Like [`read_pid_raw`](Self::read_pid_raw), bounded by `deadline`
    pub async fn read_pid_raw_until(
        &mut self,
        mode: u8,
        pid: u8,
        length: usize,
        deadline: Option<Instant>,
    ) -> Result<PidResponse, ObdError> {
        self.ensure_initialized()?;

        if mode == mode::CURRENT_DATA && !self.supported.is_supported(pid) {
            debug!("PID {:02X} not advertised by ECU, querying anyway", pid);
        }

        let mut response = PidResponse::with_capacity(length);
        self.exchange
            .request_until(
                &mut self.transceiver,
                PidRequest::new(mode, pid),
                &mut response,
                deadline,
            )
            .await?;
        Ok(response)
    }

    /// Whether the ECU advertised mode 01 support for `pid`
    pub fn is_pid_supported(&self, pid: u8) -> bool {
        self.supported.is_supported(pid)
    }

    pub fn supported_pids(&self) -> &SupportedPids {
        &self.supported
    }

    /// Negotiated addressing, `None` before `begin` or after `end`
    pub fn addressing(&self) -> Option<AddressingMode> {
        self.addressing
    }

    pub fn is_connected(&self) -> bool {
        self.addressing.is_some()
    }

    /// Set the per-wait response timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.exchange.config_mut().response_timeout_ms = timeout.as_millis() as u64;
    }

    pub fn config(&self) -> &ObdConfig {
        self.exchange.config()
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Subsystem name for a textual trouble code
    pub fn dtc_subsystem(&self, code: &str) -> Result<&'static str, CatalogError> {
        dtc_catalog::subsystem(code)
    }

    pub fn dtc_description(&self, code: &str) -> Result<&'static str, CatalogError> {
        dtc_catalog::description(code)
    }

    fn ensure_initialized(&self) -> Result<(), ObdError> {
        match self.addressing {
            Some(_) => Ok(()),
            None => Err(ObdError::NotInitialized),
        }
    }
}

impl ObdClient<MockTransceiver> {
    /// Client wired to a simulated engine ECU (no hardware required).
    ///
    /// The ECU answers on standard addressing with RPM, speed, coolant
    /// temperature and a VIN.
    pub fn mock() -> Self {
        info!("Creating mock OBD client for testing");
        let ecu = SimulatedEcu::new(AddressingMode::Standard11Bit)
            .with_supported_pids(&[0x1818_8001, 0x0000_0000])
            .with_value(mode::CURRENT_DATA, 0x05, &[0x7B])
            .with_value(mode::CURRENT_DATA, 0x0C, &[0x1A, 0xF8])
            .with_value(mode::CURRENT_DATA, 0x0D, &[0x32])
            .with_value(mode::VEHICLE_INFO, 0x02, b"\x011HGCM82633A004352");
        Self::new(MockTransceiver::with_responder(ecu), ObdConfig::default())
    }
}
