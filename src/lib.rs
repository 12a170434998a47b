#![doc(html_root_url = "https://docs.rs/meshfrag/latest")]
//! Public API for the `meshfrag` library.
//!
//! This crate splits application payloads that exceed a single mesh-network
//! packet into bounded fragments, drives them through a sliding window of
//! individually acknowledged unicasts, and reassembles inbound fragment
//! streams with fixed, small memory budgets.
//!
//! The engine is single-threaded and event driven: every entry point runs to
//! completion before the next event is processed. The radio stack, timers,
//! and the application are reached through the traits in [`transport`] and
//! [`timer`].

pub mod config;
pub mod driver;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod receiver;
pub mod timer;
pub mod transmitter;
pub mod transport;
pub mod window;
pub mod wire;

pub use config::FragmentationConfig;
pub use driver::{Event, run_until_cancelled};
pub use engine::{Fragmentation, Inbound};
pub use envelope::{ApsOptions, Destination, Envelope, GroupField, NodeId, Sequence};
pub use error::{ConfigError, SendError, TransferError, WireError};
pub use pool::{SlotHandle, SlotPool};
pub use receiver::{DeliveredMessage, IncomingSnapshot, IncomingStatus, Receiver};
pub use timer::{DelayQueueTimers, TimerSupervisor};
pub use transmitter::Transmitter;
pub use transport::{Application, DeliveryStatus, Transport, TransportError};
pub use wire::{Frame, FrameKind, decode_frame, encode_frame};
