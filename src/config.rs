//! Configuration shared by the transmit and receive halves.

use std::{num::NonZeroUsize, time::Duration};

use crate::error::ConfigError;

/// Largest window the one-byte cumulative-ack mask can describe.
pub const MAX_WINDOW_SIZE: u8 = 8;

/// Longest time an incomplete window may hold its slot.
pub const MAX_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest number of fragments a single transfer can carry.
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

const DEFAULT_POOL_SIZE: NonZeroUsize = NonZeroUsize::new(2).expect("non-zero literal");
const DEFAULT_BUFFER_SIZE: NonZeroUsize = NonZeroUsize::new(1500).expect("non-zero literal");

/// Settings that bound windowing and reassembly resource usage.
///
/// Both peers of a transfer must agree on `window_size`; everything else is
/// local. The window size is the only value that may change at runtime, see
/// [`Fragmentation::set_window_size`](crate::Fragmentation::set_window_size).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentationConfig {
    /// Fragments permitted in flight per transfer. Zero disables fragmentation.
    pub window_size: u8,
    /// Concurrent outgoing transfers.
    pub max_outgoing: NonZeroUsize,
    /// Concurrent incoming transfers.
    pub max_incoming: NonZeroUsize,
    /// Largest payload a transfer may carry, in bytes.
    pub max_buffer_size: NonZeroUsize,
    /// Time the transport may spend delivering one fragment.
    pub ack_timeout: Duration,
    /// Multiplier applied to `ack_timeout` to bound an incomplete window.
    pub max_retries: u32,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        Self {
            window_size: 1,
            max_outgoing: DEFAULT_POOL_SIZE,
            max_incoming: DEFAULT_POOL_SIZE,
            max_buffer_size: DEFAULT_BUFFER_SIZE,
            ack_timeout: Duration::from_millis(1600),
            max_retries: 3,
        }
    }
}

impl FragmentationConfig {
    /// Return a copy using `window_size`.
    #[must_use]
    pub const fn with_window_size(mut self, window_size: u8) -> Self {
        self.window_size = window_size;
        self
    }

    /// Return a copy with the given pool sizes.
    #[must_use]
    pub const fn with_pools(mut self, outgoing: NonZeroUsize, incoming: NonZeroUsize) -> Self {
        self.max_outgoing = outgoing;
        self.max_incoming = incoming;
        self
    }

    /// Return a copy bounding transfers to `max_buffer_size` bytes.
    #[must_use]
    pub const fn with_buffer_size(mut self, max_buffer_size: NonZeroUsize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Whether fragmentation is enabled at all.
    #[must_use]
    pub const fn is_enabled(&self) -> bool { self.window_size > 0 }

    /// Time an incoming window may stay incomplete before its slot is released.
    ///
    /// Saturates at [`Duration::MAX`]; [`validate`](Self::validate) rejects
    /// anything above [`MAX_REASSEMBLY_TIMEOUT`].
    #[must_use]
    pub fn reassembly_timeout(&self) -> Duration {
        self.ack_timeout
            .checked_mul(self.max_retries)
            .unwrap_or(Duration::MAX)
    }

    /// Check the configuration for values the engine cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WindowTooLarge`] when the window exceeds
    /// [`MAX_WINDOW_SIZE`], [`ConfigError::ZeroTimeout`] when no ack time
    /// is allowed, [`ConfigError::ZeroRetries`] when the retry multiplier is
    /// zero and [`ConfigError::TimeoutTooLong`] when the reassembly timeout
    /// exceeds [`MAX_REASSEMBLY_TIMEOUT`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowTooLarge {
                window: self.window_size,
                max: MAX_WINDOW_SIZE,
            });
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.reassembly_timeout() > MAX_REASSEMBLY_TIMEOUT {
            return Err(ConfigError::TimeoutTooLong {
                max: MAX_REASSEMBLY_TIMEOUT,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_embedded_budget() {
        let config = FragmentationConfig::default();
        assert_eq!(config.window_size, 1);
        assert_eq!(config.max_outgoing.get(), 2);
        assert_eq!(config.max_incoming.get(), 2);
        assert_eq!(config.max_buffer_size.get(), 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reassembly_timeout_multiplies_ack_timeout() {
        let config = FragmentationConfig {
            ack_timeout: Duration::from_millis(250),
            max_retries: 4,
            ..FragmentationConfig::default()
        };
        assert_eq!(config.reassembly_timeout(), Duration::from_secs(1));
    }

    #[rstest]
    #[case(0, true)]
    #[case(1, true)]
    #[case(8, true)]
    #[case(9, false)]
    fn validate_bounds_window(#[case] window: u8, #[case] valid: bool) {
        let config = FragmentationConfig::default().with_window_size(window);
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test]
    fn zero_window_disables_fragmentation() {
        assert!(!FragmentationConfig::default().with_window_size(0).is_enabled());
    }

    #[test]
    fn zero_ack_timeout_is_rejected() {
        let config = FragmentationConfig {
            ack_timeout: Duration::ZERO,
            ..FragmentationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn zero_retries_are_rejected() {
        let config = FragmentationConfig {
            max_retries: 0,
            ..FragmentationConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetries));
    }

    #[rstest]
    #[case(Duration::from_secs(u64::MAX / 2), 3)]
    #[case(Duration::MAX, 2)]
    #[case(Duration::from_secs(9 * 60 * 60), 3)]
    fn oversized_reassembly_timeout_is_rejected(#[case] ack_timeout: Duration, #[case] retries: u32) {
        let config = FragmentationConfig {
            ack_timeout,
            max_retries: retries,
            ..FragmentationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TimeoutTooLong {
                max: MAX_REASSEMBLY_TIMEOUT
            })
        );
    }

    #[test]
    fn overflowing_timeout_saturates() {
        let config = FragmentationConfig {
            ack_timeout: Duration::from_secs(u64::MAX / 2),
            ..FragmentationConfig::default()
        };
        assert_eq!(config.reassembly_timeout(), Duration::MAX);
    }
}
