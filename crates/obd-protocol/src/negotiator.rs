//! Addressing Negotiation
//!
//! Vehicles differ in whether their diagnostic ECUs listen on 11-bit or
//! 29-bit identifiers and there is no out-of-band way to ask. The negotiator
//! probes each scheme with a supported-PID read and keeps the first that
//! answers.

use crate::addressing::AddressingMode;
use crate::can::CanTransceiver;
use crate::error::ObdError;
use crate::exchange::PidExchange;
use crate::mode;
use crate::pid::{PidRequest, PidResponse, SupportedPids};
use tracing::{debug, info, warn};

/// Bytes in one supported-PID range reply
const SUPPORTED_RANGE_LEN: usize = 4;
/// First range query past the last one read
const SUPPORTED_RANGE_END: u8 = 0xE0;

/// Selects the addressing scheme for a bus
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressingNegotiator;

impl AddressingNegotiator {
    /// Probe standard then extended addressing.
    ///
    /// On success the exchange is left on the accepted scheme, the receive
    /// filter matches it and `supported` holds the ECU's PID bitmap.
    pub async fn negotiate<T>(
        &self,
        exchange: &mut PidExchange,
        bus: &mut T,
        supported: &mut SupportedPids,
    ) -> Result<AddressingMode, ObdError>
    where
        T: CanTransceiver + ?Sized,
    {
        supported.clear();

        for addressing in AddressingMode::PROBE_ORDER {
            debug!("Probing {:?} addressing", addressing);
            bus.set_filter(addressing.reply_id())?;
            exchange.set_addressing(addressing);

            match read_supported_pids(exchange, bus, supported).await {
                Ok(()) => {
                    info!("ECU answered on {:?} addressing", addressing);
                    return Ok(addressing);
                }
                Err(e) => {
                    debug!("{:?} probe failed: {}", addressing, e);
                    supported.clear();
                }
            }
        }

        warn!("No addressing scheme accepted");
        Err(ObdError::NoAddressingAccepted)
    }
}

/// Read the mode 01 supported-PID ranges into `supported`.
///
/// Stops early once a range reports that the next one does not exist. A
/// reply shorter than four bytes fails the whole read.
pub async fn read_supported_pids<T>(
    exchange: &mut PidExchange,
    bus: &mut T,
    supported: &mut SupportedPids,
) -> Result<(), ObdError>
where
    T: CanTransceiver + ?Sized,
{
    for base in (0x00..SUPPORTED_RANGE_END).step_by(0x20) {
        let mut response = PidResponse::with_capacity(SUPPORTED_RANGE_LEN);
        let request = PidRequest::new(mode::CURRENT_DATA, base);
        let received = exchange.request(bus, request, &mut response).await?;

        let reply: [u8; SUPPORTED_RANGE_LEN] = match response.data().try_into() {
            Ok(reply) => reply,
            Err(_) => {
                return Err(ObdError::IncompleteReply {
                    expected: SUPPORTED_RANGE_LEN,
                    received,
                })
            }
        };
        supported.set_range(base, reply);
        debug!("Supported PIDs {:02X}: {:08X}", base, supported.range(base));

        if !supported.has_next_range(base) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::{CanFrame, CanId};
    use crate::config::ObdConfig;
    use crate::mock::{MockTransceiver, SimulatedEcu};
    use std::time::Duration;
    use tokio::time::Instant;

    fn exchange() -> PidExchange {
        PidExchange::new(AddressingMode::Standard11Bit, ObdConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_standard_accepted_first() {
        let ecu = SimulatedEcu::new(AddressingMode::Standard11Bit)
            .with_supported_pids(&[0xBE1F_A813, 0x9005_B015, 0xFED0_0400]);
        let mut bus = MockTransceiver::with_responder(ecu);
        let mut exchange = exchange();
        let mut supported = SupportedPids::default();

        let mode = AddressingNegotiator
            .negotiate(&mut exchange, &mut bus, &mut supported)
            .await
            .unwrap();

        assert_eq!(mode, AddressingMode::Standard11Bit);
        assert_eq!(bus.filter(), Some(CanId::Standard(0x7E8)));
        assert_eq!(supported.range(0x00), 0xBE1F_A813);
        assert_eq!(supported.range(0x20), 0x9005_B015);
        assert_eq!(supported.range(0x40), 0xFED0_0400);
        // 0x40 range does not announce 0x60
        assert_eq!(bus.transmitted().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_extended() {
        let ecu = SimulatedEcu::new(AddressingMode::Extended29Bit)
            .with_supported_pids(&[0x8000_0000]);
        let mut bus = MockTransceiver::with_responder(ecu);
        let mut exchange = exchange();
        let mut supported = SupportedPids::default();
        let start = Instant::now();

        let mode = AddressingNegotiator
            .negotiate(&mut exchange, &mut bus, &mut supported)
            .await
            .unwrap();

        assert_eq!(mode, AddressingMode::Extended29Bit);
        assert_eq!(exchange.addressing(), AddressingMode::Extended29Bit);
        assert_eq!(bus.filter(), Some(CanId::Extended(0x18DAF110)));
        assert!(supported.is_supported(0x01));
        assert!(start.elapsed() >= Duration::from_millis(200));

        let ids: Vec<CanId> = bus.transmitted().iter().map(|tx| tx.frame.id()).collect();
        assert_eq!(ids, vec![CanId::Standard(0x7DF), CanId::Extended(0x18DB33F1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_scheme_accepted() {
        let mut bus = MockTransceiver::new();
        let mut exchange = exchange();
        let mut supported = SupportedPids::default();

        let err = AddressingNegotiator
            .negotiate(&mut exchange, &mut bus, &mut supported)
            .await
            .unwrap_err();

        assert_eq!(err, ObdError::NoAddressingAccepted);
        assert_eq!(bus.transmitted().len(), 2);
        assert_eq!(supported, SupportedPids::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_supported_reply_rejected() {
        let mut bus = MockTransceiver::with_responder(|frame: &CanFrame| {
            if frame.id() == CanId::Standard(0x7DF) {
                vec![CanFrame::new(CanId::standard(0x7E8), &[0x04, 0x41, 0x00, 0xBE, 0x1F]).unwrap()]
            } else {
                Vec::new()
            }
        });
        let mut exchange = exchange();
        let mut supported = SupportedPids::default();

        let err = read_supported_pids(&mut exchange, &mut bus, &mut supported)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ObdError::IncompleteReply {
                expected: 4,
                received: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bitmap_reset_between_negotiations() {
        let mut supported = SupportedPids::default();
        supported.set_range(0x20, [0xFF; 4]);

        let ecu = SimulatedEcu::new(AddressingMode::Standard11Bit).with_supported_pids(&[0x0800_0000]);
        let mut bus = MockTransceiver::with_responder(ecu);
        let mut exchange = exchange();

        AddressingNegotiator
            .negotiate(&mut exchange, &mut bus, &mut supported)
            .await
            .unwrap();

        assert_eq!(supported.range(0x20), 0);
        assert!(supported.is_supported(0x05));
    }
}
