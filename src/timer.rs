//! Abort timers for incomplete incoming windows.
//!
//! Each active incoming transfer owns at most one single-shot timer keyed by
//! its [`SlotHandle`]. Arming an already armed slot restarts its timer.
//! Because handles carry the slot generation, a timer that fires after its
//! slot was reused resolves to nothing in the receiver.

use std::{
    collections::HashMap,
    time::Duration,
};

use futures::future::poll_fn;
use tokio_util::time::{DelayQueue, delay_queue::Key};

use crate::pool::SlotHandle;

/// Scheduler of single-shot, cancellable per-slot timers.
pub trait TimerSupervisor {
    /// Fire `slot`'s timer after `after`, replacing any pending one.
    fn arm(&mut self, slot: SlotHandle, after: Duration);

    /// Cancel `slot`'s pending timer, if any.
    fn disarm(&mut self, slot: SlotHandle);
}

/// Tokio-backed [`TimerSupervisor`] built on [`DelayQueue`].
///
/// Expiries are pulled with [`next_expired`](Self::next_expired) by the
/// event loop, so they are processed on the same task as every other event.
#[derive(Debug, Default)]
pub struct DelayQueueTimers {
    queue: DelayQueue<SlotHandle>,
    keys: HashMap<SlotHandle, Key>,
}

impl DelayQueueTimers {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize { self.keys.len() }

    /// Whether no timer is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Whether `slot` has a pending timer.
    #[must_use]
    pub fn is_armed(&self, slot: SlotHandle) -> bool { self.keys.contains_key(&slot) }

    /// Wait for the next timer to fire.
    ///
    /// Resolves to `None` immediately when no timer is armed.
    pub async fn next_expired(&mut self) -> Option<SlotHandle> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let slot = expired.into_inner();
        self.keys.remove(&slot);
        Some(slot)
    }
}

impl TimerSupervisor for DelayQueueTimers {
    fn arm(&mut self, slot: SlotHandle, after: Duration) {
        if let Some(key) = self.keys.get(&slot) {
            self.queue.reset(key, after);
        } else {
            let key = self.queue.insert(slot, after);
            self.keys.insert(slot, key);
        }
    }

    fn disarm(&mut self, slot: SlotHandle) {
        if let Some(key) = self.keys.remove(&slot) {
            self.queue.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use tokio::time::advance;

    use super::{DelayQueueTimers, TimerSupervisor};
    use crate::pool::SlotPool;

    fn handles() -> (crate::pool::SlotHandle, crate::pool::SlotHandle) {
        let mut pool = SlotPool::new(NonZeroUsize::new(2).expect("non-zero"));
        let a = pool.allocate(()).expect("slot");
        let b = pool.allocate(()).expect("slot");
        (a, b)
    }

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires_once() {
        let (slot, _) = handles();
        let mut timers = DelayQueueTimers::new();
        timers.arm(slot, Duration::from_secs(3));
        assert!(timers.is_armed(slot));

        advance(Duration::from_secs(3)).await;
        assert_eq!(timers.next_expired().await, Some(slot));
        assert!(timers.is_empty());
        assert_eq!(timers.next_expired().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_restarts_the_countdown() {
        let (slot, other) = handles();
        let mut timers = DelayQueueTimers::new();
        timers.arm(slot, Duration::from_secs(2));
        timers.arm(other, Duration::from_secs(3));

        advance(Duration::from_secs(1)).await;
        timers.arm(slot, Duration::from_secs(5));
        assert_eq!(timers.len(), 2);

        assert_eq!(timers.next_expired().await, Some(other));
        assert_eq!(timers.next_expired().await, Some(slot));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_never_fires() {
        let (slot, _) = handles();
        let mut timers = DelayQueueTimers::new();
        timers.arm(slot, Duration::from_millis(10));
        timers.disarm(slot);
        timers.disarm(slot);

        advance(Duration::from_secs(1)).await;
        assert_eq!(timers.next_expired().await, None);
    }
}
