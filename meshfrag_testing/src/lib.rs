//! Test doubles and fixtures for exercising the `meshfrag` engine without a
//! radio stack or a runtime.
//!
//! ```rust
//! use meshfrag::{Destination, Envelope, FragmentationConfig, NodeId};
//! use meshfrag_testing::{Link, engine};
//!
//! let config = FragmentationConfig::default().with_window_size(2);
//! let mut sender = engine(config, 100);
//! let mut receiver = engine(config, 100);
//! sender
//!     .send(Destination::Direct(NodeId::new(2)), Envelope::new(0x0104, 0x0006), &[7; 250])
//!     .expect("send accepted");
//! Link::new(NodeId::new(1)).run(&mut sender, &mut receiver);
//! assert_eq!(receiver.app().messages.len(), 1);
//! ```

pub mod doubles;
pub mod link;
pub mod logging;

pub use doubles::{Completion, ManualTimers, RecordingApp, RecordingTransport, Submission, TimerCall};
pub use link::{Link, TestEngine, engine};
pub use logging::{LoggerHandle, logger};
