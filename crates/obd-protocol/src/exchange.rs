//! PID Request/Response Exchange
//!
//! Drives one OBD-II query over a [`CanTransceiver`]: bus pacing, transmit
//! with retry, a bounded receive loop, and ISO-TP style flow control for
//! replies that do not fit one frame.
//!
//! All waits use `tokio::time`, so dropping the returned future cancels the
//! exchange at the next polling point.

use crate::addressing::AddressingMode;
use crate::can::{CanFrame, CanTransceiver};
use crate::config::ObdConfig;
use crate::error::ObdError;
use crate::pid::{PidRequest, PidResponse};
use crate::state::{ExchangeState, FLOW_CONTROL_CONTINUE};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace, warn};

/// Request/response engine for one bus.
///
/// Holds the pacing timestamp for that bus; independent instances never
/// share it.
#[derive(Debug, Clone)]
pub struct PidExchange {
    addressing: AddressingMode,
    config: ObdConfig,
    /// When the last matching reply was observed
    last_response: Option<Instant>,
}

impl PidExchange {
    pub fn new(addressing: AddressingMode, config: ObdConfig) -> Self {
        Self {
            addressing,
            config,
            last_response: None,
        }
    }

    pub fn addressing(&self) -> AddressingMode {
        self.addressing
    }

    pub(crate) fn set_addressing(&mut self, addressing: AddressingMode) {
        self.addressing = addressing;
    }

    pub fn config(&self) -> &ObdConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut ObdConfig {
        &mut self.config
    }

    /// Instant of the last successful reply, if any
    pub fn last_response(&self) -> Option<Instant> {
        self.last_response
    }

    /// Query `request` and write the reply into `response`.
    ///
    /// Returns the number of bytes written. Up to 5 bytes are read from a
    /// single frame; larger capacities request a segmented transfer.
    pub async fn request<T>(
        &mut self,
        bus: &mut T,
        request: PidRequest,
        response: &mut PidResponse,
    ) -> Result<usize, ObdError>
    where
        T: CanTransceiver + ?Sized,
    {
        self.request_until(bus, request, response, None).await
    }

    /// Like [`request`](Self::request), but no wait extends past `deadline`.
    pub async fn request_until<T>(
        &mut self,
        bus: &mut T,
        request: PidRequest,
        response: &mut PidResponse,
        deadline: Option<Instant>,
    ) -> Result<usize, ObdError>
    where
        T: CanTransceiver + ?Sized,
    {
        response.set_written(0);
        let started = Instant::now();
        debug!(
            "Requesting mode {:02X} PID {:02X} ({} bytes, {:?})",
            request.mode,
            request.pid,
            response.capacity(),
            self.addressing
        );

        self.pace(deadline, started).await?;
        self.transmit(bus, &self.frame(&request.payload()))?;

        let mut state = ExchangeState::AwaitingFirstFrame;
        loop {
            state = match state {
                ExchangeState::Complete(written) => {
                    response.set_written(written);
                    debug!("Mode {:02X} PID {:02X}: {} bytes", request.mode, request.pid, written);
                    return Ok(written);
                }
                ExchangeState::Failed(err) => {
                    debug!("Mode {:02X} PID {:02X} failed: {}", request.mode, request.pid, err);
                    return Err(err);
                }
                ExchangeState::AwaitingFirstFrame => {
                    let awaiting = ExchangeState::AwaitingFirstFrame;
                    self.receive(bus, awaiting, &request, response.buffer_mut(), deadline, started)
                        .await
                }
                ExchangeState::AwaitingConsecutiveFrame(transfer) => {
                    let flow_control_at = Instant::now() + self.config.min_request_spacing();
                    wait_until(flow_control_at, deadline, started).await?;
                    trace!("Flow control for sequence {:02X}", transfer.expected_pci());
                    self.transmit(bus, &self.frame(&[FLOW_CONTROL_CONTINUE]))?;
                    let awaiting = ExchangeState::AwaitingConsecutiveFrame(transfer);
                    self.receive(bus, awaiting, &request, response.buffer_mut(), deadline, started)
                        .await
                }
            };
        }
    }

    /// Pace, then transmit a functional request carrying `payload`.
    ///
    /// Used directly for requests that expect no reply (clearing DTCs).
    pub(crate) async fn send<T>(&mut self, bus: &mut T, payload: &[u8]) -> Result<(), ObdError>
    where
        T: CanTransceiver + ?Sized,
    {
        self.pace(None, Instant::now()).await?;
        self.transmit(bus, &self.frame(payload))
    }

    /// Hold off until the minimum spacing since the last reply has passed.
    ///
    /// Fails without waiting past `deadline` if the spacing would run beyond it.
    async fn pace(&self, deadline: Option<Instant>, started: Instant) -> Result<(), ObdError> {
        let ready_at = match self.last_response {
            Some(last) => last + self.config.min_request_spacing(),
            None => Instant::now(),
        };
        trace!("Pacing bus for {:?}", ready_at.saturating_duration_since(Instant::now()));
        wait_until(ready_at, deadline, started).await
    }

    fn frame(&self, payload: &[u8]) -> CanFrame {
        CanFrame::padded(self.addressing.request_id(), payload)
    }

    /// Send `frame`, retrying immediately on failure
    fn transmit<T>(&self, bus: &mut T, frame: &CanFrame) -> Result<(), ObdError>
    where
        T: CanTransceiver + ?Sized,
    {
        let attempts = self.config.transmit_attempts.max(1);
        for attempt in 1..=attempts {
            match bus.transmit(frame) {
                Ok(()) => {
                    trace!("TX {}", frame);
                    return Ok(());
                }
                Err(e) => debug!("Transmit attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }
        warn!("Giving up on {} after {} attempts", frame, attempts);
        Err(ObdError::TransmitExhausted { attempts })
    }

    /// Poll until `state` accepts a frame or the wait budget runs out
    async fn receive<T>(
        &mut self,
        bus: &mut T,
        state: ExchangeState,
        request: &PidRequest,
        out: &mut [u8],
        deadline: Option<Instant>,
        started: Instant,
    ) -> ExchangeState
    where
        T: CanTransceiver + ?Sized,
    {
        let mut until = Instant::now() + self.config.response_timeout();
        if let Some(deadline) = deadline {
            until = until.min(deadline);
        }
        let mut poll_errors = 0u32;

        loop {
            match bus.poll() {
                Ok(Some(frame)) => {
                    if let Some(next) = state.on_frame(request, frame.data(), out) {
                        trace!("RX {}", frame);
                        self.last_response = Some(Instant::now());
                        return next;
                    }
                    debug!("Discarding unexpected frame {}", frame);
                }
                Ok(None) => {}
                Err(e) => {
                    if poll_errors == 0 {
                        warn!("CAN poll error: {}", e);
                    } else {
                        debug!("CAN poll error (repeat {}): {}", poll_errors, e);
                    }
                    poll_errors += 1;
                }
            }

            if Instant::now() >= until {
                return state.on_timeout(elapsed_ms(started));
            }
            sleep(self.config.poll_interval()).await;
        }
    }
}

/// Sleep until `target`, or fail at `deadline` if that comes first
async fn wait_until(
    target: Instant,
    deadline: Option<Instant>,
    started: Instant,
) -> Result<(), ObdError> {
    match deadline {
        Some(deadline) if deadline <= target => {
            sleep_until(deadline).await;
            debug!("Deadline reached before the bus was ready");
            Err(ObdError::ResponseTimeout(elapsed_ms(started)))
        }
        _ => {
            if target > Instant::now() {
                sleep_until(target).await;
            }
            Ok(())
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
