//! Metric helpers for `meshfrag`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. Without the `metrics`
//! feature the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking fragments handled.
pub const FRAGMENTS_TOTAL: &str = "meshfrag_fragments_total";
/// Name of the counter tracking finished transfers.
pub const TRANSFERS_TOTAL: &str = "meshfrag_transfers_total";
/// Name of the counter tracking acked incoming slots evicted for reuse.
pub const EVICTIONS_TOTAL: &str = "meshfrag_evictions_total";

/// Direction of a fragment or transfer.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Fragments received from a peer.
    Inbound,
    /// Fragments submitted to the transport.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "labels need the metrics feature"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// How a transfer ended.
#[derive(Clone, Copy, Debug)]
pub enum Outcome {
    /// Every fragment was delivered or reassembled.
    Completed,
    /// The transport refused or failed a fragment.
    Failed,
    /// Reassembly hit an inconsistency or the buffer bound.
    Aborted,
    /// The abort timer fired before the window completed.
    TimedOut,
}

impl Outcome {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "labels need the metrics feature"))]
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Aborted => "aborted",
            Outcome::TimedOut => "timed_out",
        }
    }
}

/// Record one fragment for the given direction.
pub fn inc_fragments(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAGMENTS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a finished transfer.
pub fn inc_transfers(direction: Direction, outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(
        TRANSFERS_TOTAL,
        "direction" => direction.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, outcome);
}

/// Record the eviction of an acked incoming slot.
pub fn inc_evictions() {
    #[cfg(feature = "metrics")]
    counter!(EVICTIONS_TOTAL).increment(1);
}
