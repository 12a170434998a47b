//! Collaborator interfaces at the edge of the engine.
//!
//! The mesh transport provides addressing, routing and retried unicast
//! delivery; the application consumes completed sends and reassembled
//! messages. Neither is implemented here.

use thiserror::Error;

use crate::{
    envelope::{Destination, Envelope, NodeId},
    error::TransferError,
    receiver::DeliveredMessage,
};

/// Reasons a transport refuses a submission outright.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No packet buffers are available.
    #[error("transport has no free buffers")]
    NoBuffers,
    /// The destination cannot be resolved.
    #[error("no route to destination")]
    NoRoute,
    /// The node is not joined to a network.
    #[error("network is down")]
    NetworkDown,
}

/// Final outcome of one submitted fragment, reported asynchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The peer acknowledged the fragment.
    Delivered,
    /// The transport exhausted its retries.
    Failed,
}

/// Retried-unicast transport used by the engine.
///
/// Submissions are fire-and-forget. Every accepted submission must later be
/// answered by exactly one call to
/// [`Fragmentation::on_fragment_acked`](crate::Fragmentation::on_fragment_acked),
/// never from inside `submit` itself.
pub trait Transport {
    /// Largest payload one fragment to `destination` may carry.
    fn fragment_capacity(&self, destination: &Destination, envelope: &Envelope) -> usize;

    /// Queue one fragment for retried unicast delivery.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the fragment cannot be queued.
    fn submit(
        &mut self,
        destination: &Destination,
        envelope: &Envelope,
        fragment: &[u8],
    ) -> Result<(), TransportError>;

    /// Send a cumulative acknowledgement back to `peer`.
    ///
    /// `reply` carries [`GroupField::FragmentAck`](crate::GroupField::FragmentAck).
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the reply cannot be queued.
    fn send_reply(&mut self, peer: NodeId, reply: &Envelope) -> Result<(), TransportError>;
}

/// One-time delivery points into the application layer.
pub trait Application {
    /// Called exactly once per accepted outgoing transfer.
    fn on_send_complete(
        &mut self,
        outcome: Result<(), TransferError>,
        envelope: &Envelope,
        payload: &[u8],
    );

    /// Called exactly once per fully reassembled incoming message.
    fn on_message_received(&mut self, message: DeliveredMessage);
}
