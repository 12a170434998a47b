//! Outbound half: splits payloads and drives the send window.
//!
//! A [`Transmitter`] owns a fixed pool of outgoing transfers. Each transfer
//! submits at most `window_size` fragments, waits until the transport has
//! confirmed every one of them, then moves on to the next window. The first
//! refused or failed fragment aborts the whole transfer. Every accepted
//! transfer ends with exactly one call to
//! [`Application::on_send_complete`].

use log::{debug, warn};

use crate::{
    config::FragmentationConfig,
    envelope::{ApsOptions, Destination, Envelope, GroupField, Sequence},
    error::{SendError, TransferError},
    metrics::{self, Direction, Outcome},
    pool::{SlotHandle, SlotPool},
    transport::{Application, DeliveryStatus, Transport},
    window::{fragment_count, fragment_range, window_indices},
};

#[derive(Debug)]
struct OutgoingTransfer {
    destination: Destination,
    envelope: Envelope,
    payload: Vec<u8>,
    fragment_size: usize,
    fragment_count: u8,
    window_size: u8,
    window_base: usize,
    in_transit: u8,
    // Bit n set once fragment `window_base + n` is confirmed delivered.
    delivered: u8,
}

impl OutgoingTransfer {
    fn fragment_envelope(&self, index: u8) -> Envelope {
        Envelope {
            group: GroupField::FragmentHeader {
                count: self.fragment_count,
                index,
            },
            ..self.envelope
        }
    }

    fn fragment_bytes(&self, index: usize) -> &[u8] {
        let range = fragment_range(index, self.payload.len(), self.fragment_size);
        self.payload.get(range).unwrap_or_default()
    }

    fn in_current_window(&self, index: u8) -> bool {
        window_indices(
            self.window_base,
            self.window_size,
            usize::from(self.fragment_count),
        )
        .contains(&usize::from(index))
    }

    /// Count one delivery in the current window. Returns `false` for
    /// fragments outside the window or already confirmed.
    fn confirm(&mut self, index: u8) -> bool {
        if !self.in_current_window(index) || self.in_transit == 0 {
            return false;
        }
        let Some(bit) = u32::try_from(usize::from(index) - self.window_base)
            .ok()
            .and_then(|shift| 1_u8.checked_shl(shift))
        else {
            return false;
        };
        if self.delivered & bit != 0 {
            return false;
        }
        self.delivered |= bit;
        self.in_transit -= 1;
        true
    }
}

/// Result of pushing one window to the transport.
enum WindowProgress {
    InFlight,
    Finished(Result<(), TransferError>),
}

/// Outgoing transfer pool and send-window driver.
#[derive(Debug)]
pub struct Transmitter {
    config: FragmentationConfig,
    transfers: SlotPool<OutgoingTransfer>,
    next_sequence: Sequence,
}

impl Transmitter {
    /// Create a transmitter with `config.max_outgoing` transfer slots.
    #[must_use]
    pub fn new(config: FragmentationConfig) -> Self {
        Self::with_starting_sequence(config, Sequence::new(0))
    }

    /// Create a transmitter whose first message uses `start_at`.
    #[must_use]
    pub fn with_starting_sequence(config: FragmentationConfig, start_at: Sequence) -> Self {
        Self {
            config,
            transfers: SlotPool::new(config.max_outgoing),
            next_sequence: start_at,
        }
    }

    /// Change the window used by transfers started from now on.
    pub fn set_window_size(&mut self, window_size: u8) { self.config.window_size = window_size; }

    /// Number of transfers in progress.
    #[must_use]
    pub fn active_len(&self) -> usize { self.transfers.len() }

    /// Fragments of the transfer for `sequence` awaiting transport completion.
    #[must_use]
    pub fn in_transit(&self, sequence: Sequence) -> Option<u8> {
        let handle = self.lookup(sequence)?;
        self.transfers.get(handle).map(|t| t.in_transit)
    }

    /// First fragment index of the current window of the transfer for `sequence`.
    #[must_use]
    pub fn window_base(&self, sequence: Sequence) -> Option<usize> {
        let handle = self.lookup(sequence)?;
        self.transfers.get(handle).map(|t| t.window_base)
    }

    /// Start a fragmented transfer of `payload` to `destination`.
    ///
    /// The envelope receives a fresh sequence number and the fragmented and
    /// retry option flags. The first window is submitted before returning;
    /// completion is reported later through `app`, possibly from within this
    /// call when the first window is refused by the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::FeatureDisabled`] when the window size is zero,
    /// [`SendError::MessageTooLong`] when `payload` exceeds the buffer bound,
    /// [`SendError::PoolExhausted`] when every outgoing slot is busy, and
    /// [`SendError::TooManyFragments`] when the destination's capacity would
    /// require more than 255 fragments. No transfer exists after an error.
    pub fn send<T, A>(
        &mut self,
        transport: &mut T,
        app: &mut A,
        destination: Destination,
        mut envelope: Envelope,
        payload: &[u8],
    ) -> Result<Sequence, SendError>
    where
        T: Transport,
        A: Application,
    {
        if !self.config.is_enabled() {
            return Err(SendError::FeatureDisabled);
        }
        let limit = self.config.max_buffer_size;
        if payload.len() > limit.get() {
            return Err(SendError::MessageTooLong {
                length: payload.len(),
                limit,
            });
        }
        if self.transfers.len() == self.transfers.capacity() {
            return Err(SendError::PoolExhausted {
                capacity: self.config.max_outgoing,
            });
        }

        envelope.sequence = self.claim_sequence();
        envelope.options.insert(ApsOptions::FRAGMENT);
        envelope.options.insert(ApsOptions::RETRY);

        let fragment_size = transport.fragment_capacity(&destination, &envelope);
        let required = fragment_count(payload.len(), fragment_size);
        let fragment_count =
            u8::try_from(required).map_err(|_| SendError::TooManyFragments { required })?;

        let sequence = envelope.sequence;
        let handle = self
            .transfers
            .allocate(OutgoingTransfer {
                destination,
                envelope,
                payload: payload.to_vec(),
                fragment_size,
                fragment_count,
                window_size: self.config.window_size,
                window_base: 0,
                in_transit: 0,
                delivered: 0,
            })
            .ok_or(SendError::PoolExhausted {
                capacity: self.config.max_outgoing,
            })?;
        self.next_sequence = sequence.next();
        debug!(
            "starting transfer: sequence={sequence}, destination={destination}, bytes={}, \
             fragments={fragment_count}, fragment_size={fragment_size}",
            payload.len()
        );

        self.send_window(handle, transport, app);
        Ok(sequence)
    }

    /// Handle the transport's verdict on one submitted fragment.
    ///
    /// Returns `false` when `envelope` does not belong to any outgoing
    /// transfer, so the caller can route the callback elsewhere.
    pub fn on_fragment_acked<T, A>(
        &mut self,
        transport: &mut T,
        app: &mut A,
        envelope: &Envelope,
        status: DeliveryStatus,
    ) -> bool
    where
        T: Transport,
        A: Application,
    {
        let Some(handle) = self.lookup(envelope.sequence) else {
            return false;
        };
        let Some(transfer) = self.transfers.get_mut(handle) else {
            return false;
        };
        let index = envelope.fragment_header().map_or(0, |(_, index)| index);

        match status {
            DeliveryStatus::Delivered => {
                if !transfer.confirm(index) {
                    debug!(
                        "ignoring stray completion: sequence={}, fragment={index}",
                        envelope.sequence
                    );
                    return true;
                }
                if transfer.in_transit == 0 {
                    transfer.window_base += usize::from(transfer.window_size);
                    self.send_window(handle, transport, app);
                }
            }
            DeliveryStatus::Failed => {
                warn!(
                    "fragment delivery failed, aborting transfer: sequence={}, fragment={index}",
                    envelope.sequence
                );
                self.finish(handle, app, Err(TransferError::TransportFailed { fragment: index }));
            }
        }
        true
    }

    fn send_window<T, A>(&mut self, handle: SlotHandle, transport: &mut T, app: &mut A)
    where
        T: Transport,
        A: Application,
    {
        let progress = match self.transfers.get_mut(handle) {
            Some(transfer) => Self::submit_window(transfer, transport),
            None => return,
        };
        if let WindowProgress::Finished(outcome) = progress {
            self.finish(handle, app, outcome);
        }
    }

    fn submit_window<T: Transport>(
        transfer: &mut OutgoingTransfer,
        transport: &mut T,
    ) -> WindowProgress {
        transfer.delivered = 0;
        let indices = window_indices(
            transfer.window_base,
            transfer.window_size,
            usize::from(transfer.fragment_count),
        );
        for index in indices {
            let Ok(fragment) = u8::try_from(index) else {
                break;
            };
            let envelope = transfer.fragment_envelope(fragment);
            let bytes = transfer.fragment_bytes(index);
            if let Err(source) = transport.submit(&transfer.destination, &envelope, bytes) {
                warn!(
                    "transport rejected fragment, aborting transfer: sequence={}, \
                     fragment={fragment}, error={source}",
                    envelope.sequence
                );
                return WindowProgress::Finished(Err(TransferError::TransportRejected {
                    fragment,
                    source,
                }));
            }
            transfer.in_transit += 1;
            metrics::inc_fragments(Direction::Outbound);
        }

        if transfer.in_transit == 0 {
            WindowProgress::Finished(Ok(()))
        } else {
            debug!(
                "window submitted: sequence={}, base={}, in_transit={}",
                transfer.envelope.sequence, transfer.window_base, transfer.in_transit
            );
            WindowProgress::InFlight
        }
    }

    fn finish<A: Application>(
        &mut self,
        handle: SlotHandle,
        app: &mut A,
        outcome: Result<(), TransferError>,
    ) {
        let Some(transfer) = self.transfers.release(handle) else {
            return;
        };
        let result = if outcome.is_ok() {
            Outcome::Completed
        } else {
            Outcome::Failed
        };
        metrics::inc_transfers(Direction::Outbound, result);
        debug!(
            "transfer finished: sequence={}, success={}",
            transfer.envelope.sequence,
            outcome.is_ok()
        );
        app.on_send_complete(outcome, &transfer.envelope, &transfer.payload);
    }

    fn lookup(&self, sequence: Sequence) -> Option<SlotHandle> {
        self.transfers.find(|t| t.envelope.sequence == sequence)
    }

    fn claim_sequence(&self) -> Sequence {
        std::iter::successors(Some(self.next_sequence), |s| Some(s.next()))
            .take(usize::from(u8::MAX) + 1)
            .find(|candidate| self.lookup(*candidate).is_none())
            .unwrap_or(self.next_sequence)
    }
}

