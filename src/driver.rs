//! Single-task event loop for the fragmentation engine.
//!
//! The engine's entry points must never interleave. [`run_until_cancelled`]
//! serialises them: sends, transport callbacks and inbound fragments arrive
//! as [`Event`]s on one channel, abort timers come from
//! [`DelayQueueTimers`], and each is handled to completion before the next
//! is polled.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    engine::Fragmentation,
    envelope::{Destination, Envelope, NodeId, Sequence},
    error::SendError,
    timer::DelayQueueTimers,
    transport::{Application, DeliveryStatus, Transport},
};

/// Work item for the event loop.
#[derive(Debug)]
pub enum Event {
    /// Start an outgoing transfer.
    Send {
        /// Where to send the payload.
        destination: Destination,
        /// Envelope template for the message.
        envelope: Envelope,
        /// Application payload.
        payload: Vec<u8>,
        /// Receives the synchronous result of the send, if wanted.
        reply: Option<oneshot::Sender<Result<Sequence, SendError>>>,
    },
    /// The transport finished with a submitted fragment.
    FragmentAcked {
        /// Envelope of the fragment as submitted.
        envelope: Envelope,
        /// Delivery verdict.
        status: DeliveryStatus,
    },
    /// A message arrived from the network.
    Incoming {
        /// Envelope as received.
        envelope: Envelope,
        /// Originating node.
        sender: NodeId,
        /// Payload bytes.
        payload: Vec<u8>,
    },
}

/// Process events and timer expiries until `shutdown` fires or every event
/// sender is dropped.
pub async fn run_until_cancelled<T, A>(
    engine: &mut Fragmentation<T, DelayQueueTimers, A>,
    mut events: mpsc::UnboundedReceiver<Event>,
    shutdown: CancellationToken,
) where
    T: Transport,
    A: Application,
{
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("fragmentation loop cancelled");
                break;
            }

            Some(slot) = engine.timers_mut().next_expired(), if !engine.timers().is_empty() => {
                let released = engine.on_abort_timer(slot);
                trace!(%slot, released, "abort timer fired");
            }

            event = events.recv() => match event {
                Some(event) => dispatch(engine, event),
                None => {
                    debug!("event channel closed; stopping fragmentation loop");
                    break;
                }
            },
        }
    }
}

fn dispatch<T, A>(engine: &mut Fragmentation<T, DelayQueueTimers, A>, event: Event)
where
    T: Transport,
    A: Application,
{
    match event {
        Event::Send {
            destination,
            envelope,
            payload,
            reply,
        } => {
            let result = engine.send(destination, envelope, &payload);
            if let Err(error) = &result {
                warn!(%destination, %error, "send refused");
            }
            if let Some(reply) = reply
                && reply.send(result).is_err()
            {
                debug!("send result dropped: requester went away");
            }
        }
        Event::FragmentAcked { envelope, status } => {
            if !engine.on_fragment_acked(&envelope, status) {
                trace!(sequence = %envelope.sequence, "completion for unknown transfer");
            }
        }
        Event::Incoming {
            envelope,
            sender,
            payload,
        } => {
            let inbound = engine.on_incoming(envelope, sender, &payload);
            trace!(%sender, ?inbound, "inbound message handled");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::{
        config::FragmentationConfig,
        envelope::{ApsOptions, GroupField},
        error::TransferError,
        receiver::DeliveredMessage,
        transport::TransportError,
    };

    struct Silent;

    impl Transport for Silent {
        fn fragment_capacity(&self, _: &Destination, _: &Envelope) -> usize { 32 }

        fn submit(&mut self, _: &Destination, _: &Envelope, _: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn send_reply(&mut self, _: NodeId, _: &Envelope) -> Result<(), TransportError> { Ok(()) }
    }

    impl Application for Silent {
        fn on_send_complete(&mut self, _: Result<(), TransferError>, _: &Envelope, _: &[u8]) {}

        fn on_message_received(&mut self, _: DeliveredMessage) {}
    }

    fn engine() -> Fragmentation<Silent, DelayQueueTimers, Silent> {
        Fragmentation::new(
            FragmentationConfig::default(),
            Silent,
            DelayQueueTimers::new(),
            Silent,
        )
        .expect("default config is valid")
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn expired_timer_is_traced() {
        let mut engine = engine();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let mut envelope = Envelope::new(0x0104, 0xFC00);
        envelope.options.insert(ApsOptions::FRAGMENT);
        envelope.group = GroupField::FragmentHeader { count: 2, index: 0 };
        tx.send(Event::Incoming {
            envelope,
            sender: NodeId::new(5),
            payload: vec![0; 32],
        })
        .expect("loop receiver alive");

        let stop = {
            let shutdown = shutdown.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                shutdown.cancel();
            }
        };
        tokio::join!(run_until_cancelled(&mut engine, rx, shutdown), stop);

        assert!(logs_contain("abort timer fired"));
        assert!(logs_contain("fragmentation loop cancelled"));
        drop(tx);
    }

    #[traced_test]
    #[tokio::test]
    async fn refused_send_is_traced() {
        let mut engine = engine();
        let (tx, rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Event::Send {
            destination: Destination::Direct(NodeId::new(5)),
            envelope: Envelope::new(0x0104, 0xFC00),
            payload: vec![0; 4096],
            reply: Some(reply_tx),
        })
        .expect("loop receiver alive");
        drop(tx);

        run_until_cancelled(&mut engine, rx, CancellationToken::new()).await;

        let result = reply_rx.await.expect("reply sent");
        assert!(result.is_err_and(|err| err.is_too_long()));
        assert!(logs_contain("send refused"));
        assert!(logs_contain("event channel closed"));
    }
}
