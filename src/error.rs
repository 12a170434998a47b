//! Error types surfaced by the fragmentation engine.
//!
//! Outbound failures are reported either synchronously from
//! [`Transmitter::send`](crate::Transmitter::send) or exactly once through
//! [`Application::on_send_complete`](crate::Application::on_send_complete).
//! Inbound failures are never surfaced; they only release the affected slot.

use std::{num::NonZeroUsize, time::Duration};

use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

use crate::transport::TransportError;

/// Synchronous refusals returned by [`Transmitter::send`](crate::Transmitter::send).
///
/// No transfer exists after any of these errors.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The configured window size is zero.
    #[error("fragmentation is disabled (window size is zero)")]
    FeatureDisabled,
    /// Every outgoing transfer slot is in use.
    #[error("all {capacity} outgoing transfer slots are in use")]
    PoolExhausted {
        /// Number of outgoing slots configured.
        capacity: NonZeroUsize,
    },
    /// The payload exceeds the transfer buffer bound.
    #[error("message of {length} bytes exceeds the {limit} byte buffer")]
    MessageTooLong {
        /// Length of the rejected payload.
        length: usize,
        /// Configured buffer bound.
        limit: NonZeroUsize,
    },
    /// The payload would need more fragments than a transfer can count.
    #[error("message needs {required} fragments, more than 255")]
    TooManyFragments {
        /// Fragments the payload would have required.
        required: usize,
    },
}

impl SendError {
    /// Whether the payload was refused for its size.
    #[must_use]
    pub const fn is_too_long(&self) -> bool {
        matches!(
            self,
            Self::MessageTooLong { .. } | Self::TooManyFragments { .. }
        )
    }
}

/// Terminal failure of an accepted outgoing transfer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The transport refused to accept a fragment submission.
    #[error("transport rejected fragment {fragment}: {source}")]
    TransportRejected {
        /// Index of the refused fragment.
        fragment: u8,
        /// Reason reported by the transport.
        source: TransportError,
    },
    /// The transport reported that a submitted fragment was not delivered.
    #[error("delivery of fragment {fragment} failed")]
    TransportFailed {
        /// Index of the undelivered fragment.
        fragment: u8,
    },
}

/// Invalid [`FragmentationConfig`](crate::FragmentationConfig) values.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The window does not fit the one-byte receive mask.
    #[error("window size {window} exceeds the maximum of {max}")]
    WindowTooLarge {
        /// Requested window size.
        window: u8,
        /// Largest supported window size.
        max: u8,
    },
    /// The per-fragment acknowledgement timeout is zero.
    #[error("ack timeout must be non-zero")]
    ZeroTimeout,
    /// The retry multiplier is zero, so incomplete windows expire at once.
    #[error("max retries must be non-zero")]
    ZeroRetries,
    /// `ack_timeout × max_retries` overflows or exceeds the supported bound.
    #[error("reassembly timeout exceeds the maximum of {max:?}")]
    TimeoutTooLong {
        /// Largest supported reassembly timeout.
        max: Duration,
    },
}

/// Errors raised while encoding or decoding on-air frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame header could not be serialised.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] EncodeError),
    /// The frame header could not be deserialised.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] DecodeError),
}
