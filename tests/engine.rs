//! End-to-end tests driving two engines over the in-memory link.

use meshfrag::{
    ApsOptions,
    ConfigError,
    DeliveryStatus,
    Destination,
    Envelope,
    FragmentationConfig,
    Inbound,
    NodeId,
    TransferError,
};
use meshfrag_testing::{Link, TestEngine, engine};
use rstest::rstest;

const SENDER: NodeId = NodeId::new(0x0001);
const RECIPIENT: Destination = Destination::Direct(NodeId::new(0x0002));

fn payload(len: usize) -> Vec<u8> { (0..=u8::MAX).cycle().take(len).collect() }

fn pair(window: u8, capacity: usize) -> (TestEngine, TestEngine) {
    let config = FragmentationConfig::default().with_window_size(window);
    (engine(config, capacity), engine(config, capacity))
}

#[rstest]
#[case(1, 100, 250)]
#[case(2, 100, 250)]
#[case(2, 50, 120)]
#[case(8, 82, 1500)]
#[case(3, 64, 0)]
#[case(4, 10, 40)]
fn transfer_completes_end_to_end(
    #[case] window: u8,
    #[case] capacity: usize,
    #[case] len: usize,
) {
    let (mut sender, mut receiver) = pair(window, capacity);
    let data = payload(len);
    let sequence = sender
        .send(RECIPIENT, Envelope::new(0x0104, 0xFC00), &data)
        .expect("send accepted");

    Link::new(SENDER).run(&mut sender, &mut receiver);

    let completions = &sender.app().completions;
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].outcome, Ok(()));
    assert_eq!(completions[0].envelope.sequence, sequence);

    let messages = &receiver.app().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload(), data.as_slice());
    assert_eq!(messages[0].sender(), SENDER);
    assert_eq!(messages[0].envelope().sequence, sequence);
}

#[test]
fn lost_fragment_fails_sender_and_times_out_receiver() {
    let (mut sender, mut receiver) = pair(1, 50);
    sender
        .send(RECIPIENT, Envelope::new(0x0104, 0xFC00), &payload(120))
        .expect("send accepted");

    Link::new(SENDER).losing(1).run(&mut sender, &mut receiver);

    assert_eq!(sender.transport().submitted_indices(), vec![0, 1]);
    assert_eq!(
        sender.app().completions[0].outcome,
        Err(TransferError::TransportFailed { fragment: 1 })
    );
    assert!(receiver.app().messages.is_empty());

    let armed = receiver.timers().armed();
    assert_eq!(armed.len(), 1);
    assert!(receiver.on_abort_timer(armed[0]));
    assert_eq!(receiver.receiver().occupied_len(), 0);
}

#[test]
fn artificial_drop_surfaces_as_missing_window() {
    let (mut sender, mut receiver) = pair(2, 100);
    receiver.set_artificial_drop(Some(1));
    sender
        .send(RECIPIENT, Envelope::new(0x0104, 0xFC00), &payload(250))
        .expect("send accepted");

    Link::new(SENDER).run(&mut sender, &mut receiver);

    // The link still confirmed fragment 1, so the sender moved on, but the
    // receiver's first window never filled and fragment 2 was out of range.
    assert_eq!(sender.app().completions[0].outcome, Ok(()));
    assert!(receiver.app().messages.is_empty());
    assert!(receiver.transport().acks().is_empty());
}

#[test]
fn unfragmented_messages_pass_through() {
    let (_, mut receiver) = pair(2, 100);
    let envelope = Envelope::new(0x0104, 0x0006);
    assert_eq!(receiver.on_incoming(envelope, SENDER, b"on"), Inbound::PassThrough);
    assert!(receiver.app().messages.is_empty());
    assert_eq!(receiver.receiver().occupied_len(), 0);

    let mut fragment = envelope;
    fragment.options.insert(ApsOptions::FRAGMENT);
    fragment.group = meshfrag::GroupField::FragmentHeader { count: 1, index: 0 };
    assert_eq!(receiver.on_incoming(fragment, SENDER, b"on"), Inbound::Consumed);
    assert_eq!(receiver.app().messages.len(), 1);
}

#[test]
fn window_size_is_validated() {
    let (mut sender, _) = pair(2, 100);
    assert_eq!(
        sender.set_window_size(9),
        Err(ConfigError::WindowTooLarge { window: 9, max: 8 })
    );
    assert_eq!(sender.config().window_size, 2);
    assert!(sender.set_window_size(8).is_ok());
    assert_eq!(sender.config().window_size, 8);
}

#[test]
fn invalid_config_is_refused() {
    let config = FragmentationConfig::default().with_window_size(12);
    let built = meshfrag::Fragmentation::new(
        config,
        meshfrag_testing::RecordingTransport::new(10),
        meshfrag_testing::ManualTimers::new(),
        meshfrag_testing::RecordingApp::new(),
    );
    assert!(matches!(built, Err(ConfigError::WindowTooLarge { .. })));
}

#[rstest]
#[case(FragmentationConfig { max_retries: 0, ..FragmentationConfig::default() }, ConfigError::ZeroRetries)]
#[case(
    FragmentationConfig {
        ack_timeout: std::time::Duration::from_secs(u64::MAX / 2),
        ..FragmentationConfig::default()
    },
    ConfigError::TimeoutTooLong { max: meshfrag::config::MAX_REASSEMBLY_TIMEOUT }
)]
fn unusable_timeouts_are_refused_up_front(
    #[case] config: FragmentationConfig,
    #[case] expected: ConfigError,
) {
    let built = meshfrag::Fragmentation::new(
        config,
        meshfrag_testing::RecordingTransport::new(10),
        meshfrag_testing::ManualTimers::new(),
        meshfrag_testing::RecordingApp::new(),
    );
    assert_eq!(built.err(), Some(expected));
}

#[test]
fn window_change_spares_transfers_in_flight() {
    let (mut sender, _) = pair(1, 10);
    sender
        .send(RECIPIENT, Envelope::new(0x0104, 0xFC00), &payload(40))
        .expect("send accepted");
    sender.set_window_size(4).expect("valid window");

    let first = sender.transport_mut().take_pending();
    assert_eq!(first.len(), 1);
    sender.on_fragment_acked(&first[0].envelope, DeliveryStatus::Delivered);
    assert_eq!(sender.transport_mut().take_pending().len(), 1);

    sender
        .send(RECIPIENT, Envelope::new(0x0104, 0xFC00), &payload(40))
        .expect("second send accepted");
    assert_eq!(sender.transport_mut().take_pending().len(), 4);
}
