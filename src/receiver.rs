//! Inbound half: reassembles fragment streams into complete messages.
//!
//! A [`Receiver`] keys incoming transfers by `(sender, sequence)` and keeps
//! them in a fixed pool. Each transfer tracks one receive window at a time
//! with a one-byte mask, answers with a cumulative acknowledgement whenever
//! the window fills or the final fragment arrives, and delivers the payload
//! exactly once. Completed transfers stay `Acked` so duplicate trailing
//! fragments can be acknowledged again; they are evicted, oldest first, only
//! when a new transfer needs the slot.
//!
//! Inbound failures are never reported: a transfer that overflows its
//! buffer, changes fragment length mid-window or times out simply releases
//! its slot. There is no channel to refuse a fragment, so one that cannot
//! get a slot is dropped.

use bytes::Bytes;
use derive_more::Display;
use log::{debug, warn};

use crate::{
    config::FragmentationConfig,
    envelope::{ApsOptions, Envelope, GroupField, NodeId, Sequence},
    metrics::{self, Direction, Outcome},
    pool::{SlotHandle, SlotPool},
    timer::TimerSupervisor,
    transport::Transport,
    window::{FULL_MASK, mask_baseline, mask_bit},
};

/// Lifecycle of an occupied incoming slot. Free slots are `Available`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncomingStatus {
    /// Fragments are still arriving.
    InUse,
    /// The message was delivered; the slot only answers duplicates.
    Acked,
}

/// Read-only view of an incoming transfer, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncomingSnapshot {
    /// Slot holding the transfer.
    pub slot: SlotHandle,
    /// Current lifecycle state.
    pub status: IncomingStatus,
    /// First fragment index of the current window.
    pub window_base: u8,
    /// Byte offset of the current window in the reassembly buffer.
    pub window_finger: usize,
    /// Fragment count, once fragment 0 has been seen.
    pub fragments_expected: Option<u8>,
    /// Distinct fragments stored so far.
    pub fragments_received: u8,
    /// Receive mask of the current window.
    pub mask: u8,
    /// Completions of other transfers since this one was acked.
    pub age: u32,
}

/// A fully reassembled message, handed to the application once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveredMessage {
    sender: NodeId,
    envelope: Envelope,
    payload: Bytes,
}

impl DeliveredMessage {
    /// Construct a delivered message.
    #[must_use]
    pub fn new(sender: NodeId, envelope: Envelope, payload: Bytes) -> Self {
        Self {
            sender,
            envelope,
            payload,
        }
    }

    /// Peer the message came from.
    #[must_use]
    pub const fn sender(&self) -> NodeId { self.sender }

    /// Envelope of the final fragment, with the retry flag cleared.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope { &self.envelope }

    /// Borrow the reassembled payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Consume the message, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }
}

#[derive(Debug)]
struct IncomingTransfer {
    sender: NodeId,
    sequence: Sequence,
    status: IncomingStatus,
    buffer: Box<[u8]>,
    window_size: u8,
    window_base: u8,
    window_finger: usize,
    fragments_expected: Option<u8>,
    fragments_received: u8,
    mask: u8,
    fragment_size: usize,
    // Set on creation and after every slide: the next non-final fragment
    // defines the window's fragment length.
    learn_fragment_size: bool,
    last_fragment_len: usize,
    age: u32,
}

/// Why an in-progress transfer is thrown away.
#[derive(Clone, Copy, Debug, Display)]
enum AbortReason {
    #[display("fragment length {found} differs from window length {expected}")]
    LengthMismatch { expected: usize, found: usize },
    #[display("fragment ends at byte {end}, past the {limit} byte buffer")]
    Overflow { end: usize, limit: usize },
}

impl IncomingTransfer {
    fn new(
        sender: NodeId,
        sequence: Sequence,
        config: &FragmentationConfig,
        buffer: Box<[u8]>,
    ) -> Self {
        Self {
            sender,
            sequence,
            status: IncomingStatus::InUse,
            buffer,
            window_size: config.window_size,
            window_base: 0,
            window_finger: 0,
            fragments_expected: None,
            fragments_received: 0,
            mask: mask_baseline(0, config.window_size, None),
            fragment_size: 0,
            learn_fragment_size: true,
            last_fragment_len: 0,
            age: 0,
        }
    }

    fn window_end(&self) -> usize { usize::from(self.window_base) + usize::from(self.window_size) }

    fn is_last(&self, index: u8) -> bool {
        self.fragments_expected
            .is_some_and(|expected| usize::from(index) + 1 == usize::from(expected))
    }

    fn observe_count(&mut self, index: u8, count: u8) {
        if index != 0 || self.fragments_expected.is_some() {
            return;
        }
        self.fragments_expected = Some(count);
        if count < self.window_size {
            self.mask |= mask_baseline(self.window_base, self.window_size, Some(count));
        }
    }

    /// Move to the next window when the current one is complete and `index`
    /// lies beyond it. Returns whether the window moved.
    fn slide_if_complete(&mut self, index: u8) -> bool {
        if self.status != IncomingStatus::InUse
            || self.mask != FULL_MASK
            || usize::from(index) < self.window_end()
        {
            return false;
        }
        let Ok(base) = u8::try_from(self.window_end()) else {
            return false;
        };
        self.window_base = base;
        self.window_finger += usize::from(self.window_size) * self.fragment_size;
        self.mask = mask_baseline(base, self.window_size, self.fragments_expected);
        self.learn_fragment_size = true;
        true
    }

    fn in_window(&self, index: u8) -> bool {
        let index = usize::from(index);
        index >= usize::from(self.window_base)
            && index < self.window_end()
            && self
                .fragments_expected
                .is_none_or(|expected| index < usize::from(expected))
    }

    fn store(&mut self, index: u8, fragment: &[u8]) -> Result<(), AbortReason> {
        let is_last = self.is_last(index);
        if !is_last {
            if self.learn_fragment_size {
                self.fragment_size = fragment.len();
                self.learn_fragment_size = false;
            } else if fragment.len() != self.fragment_size {
                return Err(AbortReason::LengthMismatch {
                    expected: self.fragment_size,
                    found: fragment.len(),
                });
            }
        }

        let offset =
            self.window_finger + usize::from(index - self.window_base) * self.fragment_size;
        let end = offset + fragment.len();
        let limit = self.buffer.len();
        let Some(target) = self.buffer.get_mut(offset..end) else {
            return Err(AbortReason::Overflow { end, limit });
        };
        target.copy_from_slice(fragment);
        if is_last {
            self.last_fragment_len = fragment.len();
        }
        Ok(())
    }

    /// Mark `index` as received. Returns whether an acknowledgement is due.
    fn record(&mut self, index: u8) -> bool {
        let bit = mask_bit(index, self.window_base);
        if self.mask & bit == 0 {
            self.mask |= bit;
            self.fragments_received = self.fragments_received.saturating_add(1);
        }
        self.is_last(index) || self.mask == FULL_MASK
    }

    fn is_complete(&self) -> bool {
        self.status == IncomingStatus::InUse
            && self.fragments_expected == Some(self.fragments_received)
    }

    fn total_len(&self) -> usize {
        let in_final_window = self
            .fragments_expected
            .map_or(0, |expected| usize::from(expected - self.window_base));
        self.window_finger
            + self.last_fragment_len
            + in_final_window.saturating_sub(1) * self.fragment_size
    }

    fn ack_envelope(&self, envelope: &Envelope) -> Envelope {
        let mut reply = Envelope {
            source_endpoint: envelope.destination_endpoint,
            destination_endpoint: envelope.source_endpoint,
            group: GroupField::FragmentAck {
                window_base: self.window_base,
                mask: self.mask,
            },
            ..*envelope
        };
        reply.options.remove(ApsOptions::RETRY);
        reply
    }

    fn snapshot(&self, slot: SlotHandle) -> IncomingSnapshot {
        IncomingSnapshot {
            slot,
            status: self.status,
            window_base: self.window_base,
            window_finger: self.window_finger,
            fragments_expected: self.fragments_expected,
            fragments_received: self.fragments_received,
            mask: self.mask,
            age: self.age,
        }
    }
}

fn empty_buffer(config: &FragmentationConfig) -> Box<[u8]> {
    vec![0; config.max_buffer_size.get()].into_boxed_slice()
}

/// Incoming transfer pool and reassembly engine.
#[derive(Debug)]
pub struct Receiver {
    config: FragmentationConfig,
    transfers: SlotPool<IncomingTransfer>,
    // Reassembly buffers of free slots, allocated once up front.
    idle_buffers: Vec<Box<[u8]>>,
    artificial_drop: Option<u8>,
}

impl Receiver {
    /// Create a receiver with `config.max_incoming` transfer slots.
    #[must_use]
    pub fn new(config: FragmentationConfig) -> Self {
        let idle_buffers = (0..config.max_incoming.get())
            .map(|_| empty_buffer(&config))
            .collect();
        Self {
            config,
            transfers: SlotPool::new(config.max_incoming),
            idle_buffers,
            artificial_drop: None,
        }
    }

    /// Change the window used by transfers admitted from now on.
    pub fn set_window_size(&mut self, window_size: u8) { self.config.window_size = window_size; }

    /// Discard the next arrival of fragment `index`, once.
    ///
    /// A diagnostic aid for exercising the sender's failure path; pass `None`
    /// to cancel a pending drop.
    pub fn set_artificial_drop(&mut self, index: Option<u8>) { self.artificial_drop = index; }

    /// Number of occupied incoming slots, in use or acked.
    #[must_use]
    pub fn occupied_len(&self) -> usize { self.transfers.len() }

    /// Number of reassembly buffers parked for free slots.
    #[must_use]
    pub fn idle_buffers(&self) -> usize { self.idle_buffers.len() }

    /// Inspect the transfer for `(sender, sequence)`.
    #[must_use]
    pub fn snapshot(&self, sender: NodeId, sequence: Sequence) -> Option<IncomingSnapshot> {
        let handle = self.lookup(sender, sequence)?;
        self.transfers.get(handle).map(|t| t.snapshot(handle))
    }

    /// Process one inbound fragment.
    ///
    /// Returns the reassembled message the first time the transfer
    /// completes. Envelopes without the fragmented flag are ignored and
    /// return `None`; the caller handles them as ordinary messages.
    pub fn on_incoming_fragment<T, S>(
        &mut self,
        transport: &mut T,
        timers: &mut S,
        mut envelope: Envelope,
        sender: NodeId,
        fragment: &[u8],
    ) -> Option<DeliveredMessage>
    where
        T: Transport,
        S: TimerSupervisor,
    {
        if !envelope.is_fragmented() || !self.config.is_enabled() {
            return None;
        }
        let Some((count, index)) = envelope.fragment_header() else {
            debug!("fragmented envelope without fragment header from {sender}");
            return None;
        };
        if self.artificial_drop == Some(index) {
            self.artificial_drop = None;
            debug!(
                "artificially dropping fragment: sender={sender}, sequence={}, fragment={index}",
                envelope.sequence
            );
            return None;
        }
        metrics::inc_fragments(Direction::Inbound);

        let handle = match self.lookup(sender, envelope.sequence) {
            Some(handle) => handle,
            None => self.admit(timers, sender, envelope.sequence)?,
        };
        let reassembly_timeout = self.config.reassembly_timeout();
        let transfer = self.transfers.get_mut(handle)?;

        transfer.observe_count(index, count);
        if transfer.slide_if_complete(index) {
            debug!(
                "window slid: sender={sender}, sequence={}, base={}",
                envelope.sequence, transfer.window_base
            );
            timers.arm(handle, reassembly_timeout);
        }
        if !transfer.in_window(index) {
            debug!(
                "dropping fragment outside window: sender={sender}, sequence={}, fragment={index}, \
                 base={}",
                envelope.sequence, transfer.window_base
            );
            return None;
        }

        if transfer.status == IncomingStatus::Acked {
            let reply = transfer.ack_envelope(&envelope);
            Self::send_ack(transport, sender, &reply);
            return None;
        }

        if let Err(reason) = transfer.store(index, fragment) {
            self.abort(timers, handle, reason);
            return None;
        }
        if transfer.record(index) {
            let reply = transfer.ack_envelope(&envelope);
            Self::send_ack(transport, sender, &reply);
        }
        if !transfer.is_complete() {
            return None;
        }

        timers.disarm(handle);
        envelope.options.remove(ApsOptions::RETRY);
        let length = transfer.total_len();
        let payload = Bytes::copy_from_slice(transfer.buffer.get(..length)?);
        transfer.status = IncomingStatus::Acked;
        transfer.age = 0;
        for (other, record) in self.transfers.iter_mut() {
            if other != handle && record.status == IncomingStatus::Acked {
                record.age = record.age.saturating_add(1);
            }
        }
        metrics::inc_transfers(Direction::Inbound, Outcome::Completed);
        debug!(
            "message reassembled: sender={sender}, sequence={}, bytes={length}",
            envelope.sequence
        );
        Some(DeliveredMessage::new(sender, envelope, payload))
    }

    /// Release the transfer whose abort timer fired.
    ///
    /// Returns `false` when `slot` no longer refers to a live transfer, which
    /// is the case for timers that outlived their slot.
    pub fn on_abort_timer(&mut self, slot: SlotHandle) -> bool {
        let Some(transfer) = self.transfers.release(slot) else {
            debug!("ignoring stale abort timer for {slot}");
            return false;
        };
        warn!(
            "reassembly timed out: sender={}, sequence={}, received={}",
            transfer.sender, transfer.sequence, transfer.fragments_received
        );
        metrics::inc_transfers(Direction::Inbound, Outcome::TimedOut);
        self.recycle(transfer);
        true
    }

    fn lookup(&self, sender: NodeId, sequence: Sequence) -> Option<SlotHandle> {
        self.transfers.find(|t| t.sender == sender && t.sequence == sequence)
    }

    /// Claim a slot for a new transfer, evicting the stalest acked one if
    /// every slot is occupied.
    fn admit<S: TimerSupervisor>(
        &mut self,
        timers: &mut S,
        sender: NodeId,
        sequence: Sequence,
    ) -> Option<SlotHandle> {
        if self.transfers.len() == self.transfers.capacity() {
            let Some((victim, _)) = self
                .transfers
                .iter()
                .filter(|(_, t)| t.status == IncomingStatus::Acked)
                .max_by_key(|(_, t)| t.age)
            else {
                debug!(
                    "no incoming slot available, dropping fragment: sender={sender}, \
                     sequence={sequence}"
                );
                return None;
            };
            if let Some(evicted) = self.transfers.release(victim) {
                debug!(
                    "evicting acked transfer: sender={}, sequence={}, age={}",
                    evicted.sender, evicted.sequence, evicted.age
                );
                metrics::inc_evictions();
                self.recycle(evicted);
            }
            timers.disarm(victim);
        }

        let buffer = self
            .idle_buffers
            .pop()
            .unwrap_or_else(|| empty_buffer(&self.config));
        let handle = self
            .transfers
            .allocate(IncomingTransfer::new(sender, sequence, &self.config, buffer))?;
        timers.arm(handle, self.config.reassembly_timeout());
        Some(handle)
    }

    fn abort<S: TimerSupervisor>(&mut self, timers: &mut S, handle: SlotHandle, reason: AbortReason) {
        timers.disarm(handle);
        if let Some(transfer) = self.transfers.release(handle) {
            warn!(
                "aborting reassembly: sender={}, sequence={}, reason={reason}",
                transfer.sender, transfer.sequence
            );
            metrics::inc_transfers(Direction::Inbound, Outcome::Aborted);
            self.recycle(transfer);
        }
    }

    /// Park a released transfer's buffer, wiped, for the next admission.
    fn recycle(&mut self, transfer: IncomingTransfer) {
        let mut buffer = transfer.buffer;
        buffer.fill(0);
        self.idle_buffers.push(buffer);
    }

    fn send_ack<T: Transport>(transport: &mut T, peer: NodeId, reply: &Envelope) {
        if let Err(err) = transport.send_reply(peer, reply) {
            debug!("failed to queue fragment ack to {peer}: {err}");
        }
    }
}
