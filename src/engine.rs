//! Facade tying both halves of the engine to their collaborators.
//!
//! [`Fragmentation`] owns the transport, the timer supervisor and the
//! application alongside the [`Transmitter`] and [`Receiver`], so each entry
//! point can run to completion without the caller juggling borrows.

use crate::{
    config::FragmentationConfig,
    envelope::{Destination, Envelope, NodeId, Sequence},
    error::{ConfigError, SendError},
    pool::SlotHandle,
    receiver::Receiver,
    timer::TimerSupervisor,
    transmitter::Transmitter,
    transport::{Application, DeliveryStatus, Transport},
};

/// What happened to an inbound message handed to
/// [`Fragmentation::on_incoming`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// The message was a fragment and the engine handled it.
    Consumed,
    /// The message is not fragmented; route it as an ordinary message.
    PassThrough,
}

/// Fragmentation engine bound to its transport, timers and application.
#[derive(Debug)]
pub struct Fragmentation<T, S, A> {
    config: FragmentationConfig,
    transmitter: Transmitter,
    receiver: Receiver,
    transport: T,
    timers: S,
    app: A,
}

impl<T, S, A> Fragmentation<T, S, A>
where
    T: Transport,
    S: TimerSupervisor,
    A: Application,
{
    /// Build an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config` fails
    /// [`FragmentationConfig::validate`].
    pub fn new(
        config: FragmentationConfig,
        transport: T,
        timers: S,
        app: A,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            transmitter: Transmitter::new(config),
            receiver: Receiver::new(config),
            transport,
            timers,
            app,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &FragmentationConfig { &self.config }

    /// Change the window size for transfers started from now on.
    ///
    /// Transfers already in progress keep the window they started with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::WindowTooLarge`] when `window_size` exceeds the
    /// mask width; the previous window stays in force.
    pub fn set_window_size(&mut self, window_size: u8) -> Result<(), ConfigError> {
        let candidate = self.config.with_window_size(window_size);
        candidate.validate()?;
        self.config = candidate;
        self.transmitter.set_window_size(window_size);
        self.receiver.set_window_size(window_size);
        Ok(())
    }

    /// Start a fragmented transfer; see [`Transmitter::send`].
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] when the transfer cannot be started.
    pub fn send(
        &mut self,
        destination: Destination,
        envelope: Envelope,
        payload: &[u8],
    ) -> Result<Sequence, SendError> {
        self.transmitter.send(
            &mut self.transport,
            &mut self.app,
            destination,
            envelope,
            payload,
        )
    }

    /// Forward the transport's verdict on a submitted fragment.
    ///
    /// Returns `false` when the envelope belongs to no outgoing transfer.
    pub fn on_fragment_acked(&mut self, envelope: &Envelope, status: DeliveryStatus) -> bool {
        self.transmitter.on_fragment_acked(
            &mut self.transport,
            &mut self.app,
            envelope,
            status,
        )
    }

    /// Route an inbound message, delivering completed reassemblies to the
    /// application.
    pub fn on_incoming(&mut self, envelope: Envelope, sender: NodeId, payload: &[u8]) -> Inbound {
        if !envelope.is_fragmented() {
            return Inbound::PassThrough;
        }
        if let Some(message) = self.receiver.on_incoming_fragment(
            &mut self.transport,
            &mut self.timers,
            envelope,
            sender,
            payload,
        ) {
            self.app.on_message_received(message);
        }
        Inbound::Consumed
    }

    /// Forward an expired abort timer to the receiver.
    pub fn on_abort_timer(&mut self, slot: SlotHandle) -> bool { self.receiver.on_abort_timer(slot) }

    /// Discard the next arrival of fragment `index`, once.
    pub fn set_artificial_drop(&mut self, index: Option<u8>) {
        self.receiver.set_artificial_drop(index);
    }

    /// Borrow the transmit half.
    #[must_use]
    pub const fn transmitter(&self) -> &Transmitter { &self.transmitter }

    /// Borrow the receive half.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver { &self.receiver }

    /// Borrow the transport.
    #[must_use]
    pub const fn transport(&self) -> &T { &self.transport }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    /// Borrow the timer supervisor.
    #[must_use]
    pub const fn timers(&self) -> &S { &self.timers }

    /// Mutably borrow the timer supervisor.
    pub fn timers_mut(&mut self) -> &mut S { &mut self.timers }

    /// Borrow the application.
    #[must_use]
    pub const fn app(&self) -> &A { &self.app }

    /// Mutably borrow the application.
    pub fn app_mut(&mut self) -> &mut A { &mut self.app }
}
