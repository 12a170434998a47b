//! Simulation binary for `meshfrag`.
//!
//! Runs one fragmented transfer between two nodes joined by an in-memory
//! link. Every fragment is encoded and decoded with the wire codec on its
//! way across, and the link reports delivery back to the sender the way a
//! retried-unicast transport would.

mod cli;

use std::{collections::VecDeque, error::Error, time::Duration};

use clap::Parser;
use meshfrag::{
    Application,
    DelayQueueTimers,
    DeliveredMessage,
    DeliveryStatus,
    Destination,
    Envelope,
    Fragmentation,
    FragmentationConfig,
    FrameKind,
    NodeId,
    TransferError,
    Transport,
    TransportError,
    decode_frame,
    encode_frame,
};
use tracing::{info, warn};

const SENDER: NodeId = NodeId::new(0x0001);
const RECIPIENT: NodeId = NodeId::new(0x0002);

/// Transport half of the simulated link: frames queue up until the
/// simulation moves them to the peer.
#[derive(Debug)]
struct LinkTransport {
    node: NodeId,
    fragment_size: usize,
    outbox: VecDeque<Vec<u8>>,
    failures: Vec<String>,
}

impl LinkTransport {
    fn new(node: NodeId, fragment_size: usize) -> Self {
        Self {
            node,
            fragment_size,
            outbox: VecDeque::new(),
            failures: Vec::new(),
        }
    }

    fn queue(&mut self, kind: FrameKind, envelope: &Envelope, payload: &[u8]) {
        match encode_frame(kind, self.node, envelope, payload) {
            Ok(frame) => self.outbox.push_back(frame),
            Err(err) => self.failures.push(err.to_string()),
        }
    }
}

impl Transport for LinkTransport {
    fn fragment_capacity(&self, _destination: &Destination, _envelope: &Envelope) -> usize {
        self.fragment_size
    }

    fn submit(
        &mut self,
        _destination: &Destination,
        envelope: &Envelope,
        fragment: &[u8],
    ) -> Result<(), TransportError> {
        self.queue(FrameKind::Data, envelope, fragment);
        Ok(())
    }

    fn send_reply(&mut self, _peer: NodeId, reply: &Envelope) -> Result<(), TransportError> {
        self.queue(FrameKind::Reply, reply, &[]);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Report {
    outcome: Option<Result<(), TransferError>>,
    delivered: Vec<DeliveredMessage>,
}

impl Application for Report {
    fn on_send_complete(
        &mut self,
        outcome: Result<(), TransferError>,
        _envelope: &Envelope,
        _payload: &[u8],
    ) {
        self.outcome = Some(outcome);
    }

    fn on_message_received(&mut self, message: DeliveredMessage) { self.delivered.push(message); }
}

type Node = Fragmentation<LinkTransport, DelayQueueTimers, Report>;

fn node(
    config: FragmentationConfig,
    id: NodeId,
    fragment_size: usize,
) -> Result<Node, Box<dyn Error>> {
    Ok(Fragmentation::new(
        config,
        LinkTransport::new(id, fragment_size),
        DelayQueueTimers::new(),
        Report::default(),
    )?)
}

/// Move queued frames across the link until both directions are idle.
fn pump(
    sender: &mut Node,
    recipient: &mut Node,
    drop_fragment: Option<u8>,
) -> Result<usize, Box<dyn Error>> {
    let mut acks = 0;
    loop {
        for bytes in recipient.transport_mut().outbox.drain(..) {
            let reply = decode_frame(&bytes)?;
            if let Some((base, mask)) = reply.envelope.fragment_ack() {
                info!(base, mask = format_args!("{mask:#010b}"), "window acknowledged");
                acks += 1;
            }
        }
        let Some(bytes) = sender.transport_mut().outbox.pop_front() else {
            return Ok(acks);
        };
        let frame = decode_frame(&bytes)?;
        let index = frame.envelope.fragment_header().map(|(_, index)| index);
        if index.is_some() && index == drop_fragment {
            warn!(fragment = ?index, "link lost fragment");
            sender.on_fragment_acked(&frame.envelope, DeliveryStatus::Failed);
            continue;
        }
        recipient.on_incoming(frame.envelope, frame.sender, &frame.payload);
        sender.on_fragment_acked(&frame.envelope, DeliveryStatus::Delivered);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // Enable structured logging for the simulation.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = FragmentationConfig {
        ack_timeout: Duration::from_millis(cli.ack_timeout_ms),
        ..FragmentationConfig::default().with_window_size(cli.window)
    };
    let mut sender = node(config, SENDER, cli.fragment_size)?;
    let mut recipient = node(config, RECIPIENT, cli.fragment_size)?;

    let payload: Vec<u8> = (0..=250u8).cycle().take(cli.length).collect();
    let sequence = sender.send(
        Destination::Direct(RECIPIENT),
        Envelope::new(0x0104, 0xFC00),
        &payload,
    )?;
    info!(%sequence, bytes = payload.len(), "transfer started");

    let acks = pump(&mut sender, &mut recipient, cli.drop_fragment)?;
    if !recipient.timers().is_empty() {
        info!(
            timeout = ?config.reassembly_timeout(),
            "waiting for the recipient to abandon its incomplete reassembly"
        );
        if let Some(slot) = recipient.timers_mut().next_expired().await {
            recipient.on_abort_timer(slot);
            println!("recipient released {slot} after timeout");
        }
    }

    match sender.app().outcome {
        Some(Ok(())) => println!("send complete: {} bytes, {acks} window acks", payload.len()),
        Some(Err(err)) => println!("send failed: {err}"),
        None => println!("send still in progress"),
    }
    for message in &recipient.app().delivered {
        let intact = message.payload() == payload.as_slice();
        println!(
            "received {} bytes from {} (intact: {intact})",
            message.payload().len(),
            message.sender()
        );
    }
    for failure in sender
        .transport()
        .failures
        .iter()
        .chain(&recipient.transport().failures)
    {
        println!("encode failure: {failure}");
    }
    Ok(())
}
