//! Tests for `meshfrag` metrics helpers.
//!
//! These tests verify that counters update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use meshfrag::{Destination, Envelope, FragmentationConfig, NodeId, metrics as fragmetrics};
use meshfrag_testing::{Link, engine};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let matches = key.key().name() == name
                && labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == *k && label.value() == *v)
                });
            match value {
                DebugValue::Counter(c) if matches => Some(c),
                _ => None,
            }
        })
}

#[rstest]
#[case(fragmetrics::Direction::Inbound, "inbound")]
#[case(fragmetrics::Direction::Outbound, "outbound")]
fn fragment_metric_increments(#[case] direction: fragmetrics::Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || fragmetrics::inc_fragments(direction));

    assert_eq!(
        counter(&snapshotter, fragmetrics::FRAGMENTS_TOTAL, &[("direction", label)]),
        Some(1)
    );
}

#[test]
fn transfer_metric_carries_outcome() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        fragmetrics::inc_transfers(
            fragmetrics::Direction::Inbound,
            fragmetrics::Outcome::TimedOut,
        );
    });

    assert_eq!(
        counter(
            &snapshotter,
            fragmetrics::TRANSFERS_TOTAL,
            &[("direction", "inbound"), ("outcome", "timed_out")]
        ),
        Some(1)
    );
}

#[test]
fn end_to_end_transfer_is_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let config = FragmentationConfig::default().with_window_size(2);
    let mut sender = engine(config, 100);
    let mut receiver = engine(config, 100);

    metrics::with_local_recorder(&recorder, || {
        sender
            .send(
                Destination::Direct(NodeId::new(2)),
                Envelope::new(0x0104, 0xFC00),
                &[0xAB; 250],
            )
            .expect("send accepted");
        Link::new(NodeId::new(1)).run(&mut sender, &mut receiver);
    });

    assert_eq!(
        counter(&snapshotter, fragmetrics::FRAGMENTS_TOTAL, &[("direction", "outbound")]),
        Some(3)
    );
    assert_eq!(
        counter(&snapshotter, fragmetrics::FRAGMENTS_TOTAL, &[("direction", "inbound")]),
        Some(3)
    );
    for direction in ["inbound", "outbound"] {
        assert_eq!(
            counter(
                &snapshotter,
                fragmetrics::TRANSFERS_TOTAL,
                &[("direction", direction), ("outcome", "completed")]
            ),
            Some(1),
            "{direction} transfer not counted"
        );
    }
}

#[test]
fn eviction_is_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let config = FragmentationConfig::default();
    let mut sender = engine(config, 100);
    let mut receiver = engine(config, 100);

    metrics::with_local_recorder(&recorder, || {
        for peer in 1..=3 {
            sender
                .send(
                    Destination::Direct(NodeId::new(9)),
                    Envelope::new(0x0104, 0xFC00),
                    b"hello",
                )
                .expect("send accepted");
            Link::new(NodeId::new(peer)).run(&mut sender, &mut receiver);
        }
    });

    assert_eq!(receiver.app().messages.len(), 3);
    assert_eq!(counter(&snapshotter, fragmetrics::EVICTIONS_TOTAL, &[]), Some(1));
}
