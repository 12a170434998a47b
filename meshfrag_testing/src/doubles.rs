//! Recording implementations of the engine's collaborator traits.

use std::{collections::HashMap, time::Duration};

use meshfrag::{
    Application,
    DeliveredMessage,
    Destination,
    Envelope,
    NodeId,
    SlotHandle,
    TimerSupervisor,
    TransferError,
    Transport,
    TransportError,
};

/// One fragment handed to [`RecordingTransport::submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub destination: Destination,
    pub envelope: Envelope,
    pub payload: Vec<u8>,
}

impl Submission {
    /// Fragment index carried in the envelope.
    ///
    /// # Panics
    ///
    /// Panics if the envelope has no fragment header.
    pub fn index(&self) -> u8 {
        self.envelope
            .fragment_header()
            .map(|(_, index)| index)
            .expect("submission carries a fragment header")
    }
}

/// Transport double that records every submission and reply.
///
/// Submissions are also queued so a test can hand them to a peer in order
/// with [`take_pending`](Self::take_pending).
#[derive(Debug)]
pub struct RecordingTransport {
    capacity: usize,
    submitted: Vec<Submission>,
    pending: usize,
    replies: Vec<(NodeId, Envelope)>,
    reject_at: Option<(usize, TransportError)>,
}

impl RecordingTransport {
    /// Transport that fits `capacity` payload bytes in each fragment.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            submitted: Vec::new(),
            pending: 0,
            replies: Vec::new(),
            reject_at: None,
        }
    }

    /// Refuse the submission with zero-based position `nth` with `error`.
    #[must_use]
    pub fn rejecting_at(mut self, nth: usize, error: TransportError) -> Self {
        self.reject_at = Some((nth, error));
        self
    }

    /// Every accepted submission so far.
    pub fn submitted(&self) -> &[Submission] { &self.submitted }

    /// Fragment indices of every accepted submission, in order.
    pub fn submitted_indices(&self) -> Vec<u8> {
        self.submitted.iter().map(Submission::index).collect()
    }

    /// Accepted submissions not yet taken with this method.
    pub fn take_pending(&mut self) -> Vec<Submission> {
        let fresh = self.submitted.get(self.pending..).unwrap_or_default().to_vec();
        self.pending = self.submitted.len();
        fresh
    }

    /// Every acknowledgement reply sent so far.
    pub fn replies(&self) -> &[(NodeId, Envelope)] { &self.replies }

    /// `(window_base, mask)` of every reply, in order.
    pub fn acks(&self) -> Vec<(u8, u8)> {
        self.replies
            .iter()
            .filter_map(|(_, envelope)| envelope.fragment_ack())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn fragment_capacity(&self, _destination: &Destination, _envelope: &Envelope) -> usize {
        self.capacity
    }

    fn submit(
        &mut self,
        destination: &Destination,
        envelope: &Envelope,
        fragment: &[u8],
    ) -> Result<(), TransportError> {
        if let Some((nth, error)) = self.reject_at
            && nth == self.submitted.len()
        {
            self.reject_at = None;
            return Err(error);
        }
        self.submitted.push(Submission {
            destination: *destination,
            envelope: *envelope,
            payload: fragment.to_vec(),
        });
        Ok(())
    }

    fn send_reply(&mut self, peer: NodeId, reply: &Envelope) -> Result<(), TransportError> {
        self.replies.push((peer, *reply));
        Ok(())
    }
}

/// A call made on [`ManualTimers`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCall {
    Arm(SlotHandle, Duration),
    Disarm(SlotHandle),
}

/// Timer double: nothing fires unless the test calls the engine's abort
/// entry point itself.
#[derive(Debug, Default)]
pub struct ManualTimers {
    armed: HashMap<SlotHandle, Duration>,
    calls: Vec<TimerCall>,
}

impl ManualTimers {
    pub fn new() -> Self { Self::default() }

    /// Whether `slot` currently has a pending timer.
    pub fn is_armed(&self, slot: SlotHandle) -> bool { self.armed.contains_key(&slot) }

    /// Delay of `slot`'s pending timer.
    pub fn deadline(&self, slot: SlotHandle) -> Option<Duration> { self.armed.get(&slot).copied() }

    /// Every slot with a pending timer.
    pub fn armed(&self) -> Vec<SlotHandle> { self.armed.keys().copied().collect() }

    /// History of arm and disarm calls.
    pub fn calls(&self) -> &[TimerCall] { &self.calls }
}

impl TimerSupervisor for ManualTimers {
    fn arm(&mut self, slot: SlotHandle, after: Duration) {
        self.armed.insert(slot, after);
        self.calls.push(TimerCall::Arm(slot, after));
    }

    fn disarm(&mut self, slot: SlotHandle) {
        self.armed.remove(&slot);
        self.calls.push(TimerCall::Disarm(slot));
    }
}

/// Outcome reported through [`Application::on_send_complete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub outcome: Result<(), TransferError>,
    pub envelope: Envelope,
    pub payload: Vec<u8>,
}

/// Application double collecting completions and delivered messages.
#[derive(Debug, Default)]
pub struct RecordingApp {
    pub completions: Vec<Completion>,
    pub messages: Vec<DeliveredMessage>,
}

impl RecordingApp {
    pub fn new() -> Self { Self::default() }
}

impl Application for RecordingApp {
    fn on_send_complete(
        &mut self,
        outcome: Result<(), TransferError>,
        envelope: &Envelope,
        payload: &[u8],
    ) {
        self.completions.push(Completion {
            outcome,
            envelope: *envelope,
            payload: payload.to_vec(),
        });
    }

    fn on_message_received(&mut self, message: DeliveredMessage) { self.messages.push(message); }
}
