//! In-memory link between two engines wired to the recording doubles.

use meshfrag::{
    DeliveryStatus,
    Fragmentation,
    FragmentationConfig,
    NodeId,
};

use crate::doubles::{ManualTimers, RecordingApp, RecordingTransport};

/// Engine wired to recording doubles.
pub type TestEngine = Fragmentation<RecordingTransport, ManualTimers, RecordingApp>;

/// Build a [`TestEngine`] whose transport fits `capacity` bytes per fragment.
///
/// # Panics
///
/// Panics if `config` is invalid.
pub fn engine(config: FragmentationConfig, capacity: usize) -> TestEngine {
    Fragmentation::new(
        config,
        RecordingTransport::new(capacity),
        ManualTimers::new(),
        RecordingApp::new(),
    )
    .expect("valid fragmentation config")
}

/// Carries fragments from one engine to another.
///
/// Every fragment the sender submits is handed to the receiver, then
/// reported to the sender as delivered. Fragments listed in `lost` are
/// reported as failed instead and never reach the receiver.
#[derive(Debug)]
pub struct Link {
    sender_id: NodeId,
    lost: Vec<u8>,
}

impl Link {
    pub fn new(sender_id: NodeId) -> Self {
        Self {
            sender_id,
            lost: Vec::new(),
        }
    }

    /// Fail the next transmission of fragment `index`.
    #[must_use]
    pub fn losing(mut self, index: u8) -> Self {
        self.lost.push(index);
        self
    }

    /// Move fragments until the sender has nothing left to submit.
    ///
    /// Returns the number of fragments carried, lost ones included.
    pub fn run(&mut self, sender: &mut TestEngine, receiver: &mut TestEngine) -> usize {
        let mut carried = 0;
        loop {
            let pending = sender.transport_mut().take_pending();
            if pending.is_empty() {
                return carried;
            }
            for submission in pending {
                carried += 1;
                let index = submission.index();
                if let Some(pos) = self.lost.iter().position(|lost| *lost == index) {
                    self.lost.remove(pos);
                    sender.on_fragment_acked(&submission.envelope, DeliveryStatus::Failed);
                    continue;
                }
                receiver.on_incoming(submission.envelope, self.sender_id, &submission.payload);
                sender.on_fragment_acked(&submission.envelope, DeliveryStatus::Delivered);
            }
        }
    }
}
