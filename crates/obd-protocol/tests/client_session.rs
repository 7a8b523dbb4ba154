//! End-to-end sessions against a simulated engine ECU
//!
//! Exercises the public API only: a client over a boxed transceiver,
//! negotiation, single and segmented reads, cancellation and teardown.

use obd_protocol::mock::{MockTransceiver, SimulatedEcu};
use obd_protocol::{
    mode, AddressingMode, CanFrame, CanId, CanTransceiver, DriverError, ObdClient, ObdConfig,
    ObdError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn engine_ecu(addressing: AddressingMode) -> SimulatedEcu {
    SimulatedEcu::new(addressing)
        .with_supported_pids(&[0x0818_0001, 0x0000_0001, 0x0000_0000])
        .with_value(mode::CURRENT_DATA, 0x05, &[0x7B])
        .with_value(mode::CURRENT_DATA, 0x0C, &[0x0F, 0xA0])
        .with_value(mode::VEHICLE_INFO, 0x02, b"\x01WF0XXXGCDX1234567")
}

/// Transceiver that shares its frame log with the test
struct SharedBus {
    inner: MockTransceiver,
    log: Arc<Mutex<Vec<CanFrame>>>,
}

impl CanTransceiver for SharedBus {
    fn open(&mut self, bitrate: u32) -> Result<(), DriverError> {
        self.inner.open(bitrate)
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn set_filter(&mut self, id: CanId) -> Result<(), DriverError> {
        self.inner.set_filter(id)
    }

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), DriverError> {
        self.inner.transmit(frame)?;
        self.log.lock().unwrap().push(*frame);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<CanFrame>, DriverError> {
        self.inner.poll()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_session_over_boxed_transceiver() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let bus: Box<dyn CanTransceiver> = Box::new(SharedBus {
        inner: MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit)),
        log: log.clone(),
    });
    let mut client = ObdClient::new(bus, ObdConfig::default());

    assert_eq!(client.begin().await.unwrap(), AddressingMode::Standard11Bit);
    // ranges 0x00, 0x20 and 0x40; the 0x40 range ends the chain
    assert_eq!(log.lock().unwrap().len(), 3);
    assert!(client.is_pid_supported(0x05));
    assert!(client.is_pid_supported(0x0C));
    assert!(client.is_pid_supported(0x40));
    assert!(!client.is_pid_supported(0x41));

    let coolant = client.read_pid_raw(mode::CURRENT_DATA, 0x05, 1).await.unwrap();
    assert_eq!(coolant.data(), &[0x7B]);

    let vin = client.read_pid_raw(mode::VEHICLE_INFO, 0x02, 18).await.unwrap();
    assert_eq!(&vin.data()[1..], b"WF0XXXGCDX1234567");

    // request, then three flow-control frames for the 15 remaining bytes
    let frames = log.lock().unwrap().clone();
    let flow_control = frames.iter().filter(|f| f.data()[0] == 0x30).count();
    assert_eq!(flow_control, 3);

    client.clear_all_stored_dtc().await.unwrap();
    assert_eq!(log.lock().unwrap().last().unwrap().data()[..2], [0x00, 0x04]);

    client.end();
    assert!(!client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_session_on_extended_addressing() {
    init_tracing();
    let bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Extended29Bit));
    let mut client = ObdClient::new(bus, ObdConfig::default());

    assert_eq!(client.begin().await.unwrap(), AddressingMode::Extended29Bit);
    assert_eq!(client.transceiver().filter(), Some(CanId::Extended(0x18DA_F110)));

    let rpm = client.read_pid_raw(mode::CURRENT_DATA, 0x0C, 2).await.unwrap();
    assert_eq!(rpm.data(), &[0x0F, 0xA0]);
}

#[tokio::test(start_paused = true)]
async fn test_reads_respect_request_spacing() {
    init_tracing();
    let bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit));
    let mut client = ObdClient::new(bus, ObdConfig::default());
    client.begin().await.unwrap();

    for _ in 0..3 {
        client.read_pid_raw(mode::CURRENT_DATA, 0x0C, 2).await.unwrap();
    }

    let sent = client.transceiver().transmitted();
    for pair in sent.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(60));
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_read_leaves_client_usable() {
    init_tracing();
    let bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit));
    let mut client = ObdClient::new(bus, ObdConfig::default());
    client.begin().await.unwrap();

    // unknown PID: the ECU answers negatively and the read would wait out its timeout
    let cancelled = tokio::time::timeout(
        Duration::from_millis(80),
        client.read_pid_raw(mode::CURRENT_DATA, 0x33, 2),
    )
    .await;
    assert!(cancelled.is_err());

    let coolant = client.read_pid_raw(mode::CURRENT_DATA, 0x05, 1).await.unwrap();
    assert_eq!(coolant.data(), &[0x7B]);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_shortens_wait() {
    init_tracing();
    let bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit));
    let mut client = ObdClient::new(bus, ObdConfig::default());
    client.begin().await.unwrap();

    let deadline = Instant::now() + Duration::from_millis(100);
    let err = client
        .read_pid_raw_until(mode::CURRENT_DATA, 0x33, 2, Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(err, ObdError::ResponseTimeout(_)));
    assert!(Instant::now() <= deadline + Duration::from_millis(2));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_inside_pacing_window_sends_nothing() {
    init_tracing();
    let bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit));
    let mut client = ObdClient::new(bus, ObdConfig::default());
    client.begin().await.unwrap();
    let sent_before = client.transceiver().transmitted().len();

    let start = Instant::now();
    let deadline = start + Duration::from_millis(20);
    let err = client
        .read_pid_raw_until(mode::CURRENT_DATA, 0x33, 2, Some(deadline))
        .await
        .unwrap_err();

    assert!(matches!(err, ObdError::ResponseTimeout(ms) if ms >= 20));
    assert_eq!(client.transceiver().transmitted().len(), sent_before);
    assert!(Instant::now() <= deadline + Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn test_configured_retry_budget() {
    init_tracing();
    let config = ObdConfig {
        transmit_attempts: 3,
        ..ObdConfig::default()
    };
    let mut bus = MockTransceiver::with_responder(engine_ecu(AddressingMode::Standard11Bit));
    bus.fail_all_transmits();
    let mut client = ObdClient::new(bus, config);

    let err = client.begin().await.unwrap_err();
    assert_eq!(err, ObdError::NoAddressingAccepted);
    // both schemes tried, three attempts each
    assert_eq!(client.transceiver().transmit_attempts(), 6);
    assert!(!client.transceiver().is_open());
}

#[test]
fn test_trouble_code_lookup_through_client() {
    let client = ObdClient::mock();
    assert_eq!(client.dtc_subsystem("B0012").unwrap(), "Body (includes A/C & Airbag)");
    assert_eq!(
        client.dtc_description("P000A").unwrap(),
        "A Camshaft Position Slow Response Bank 1"
    );
}
