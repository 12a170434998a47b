//! On-air encoding of envelopes and fragment payloads.
//!
//! A frame is laid out as `[u16 header_len][header bytes][payload]`, where
//! the header is a bincode-encoded [`WireHeader`]. The group slot travels as
//! the packed 16-bit value the radio stack expects; the frame kind tells
//! the decoder whether to read it as a fragment header, an acknowledgement
//! or a plain group id.

use bincode::{
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

use crate::{
    envelope::{ApsOptions, Envelope, GroupField, NodeId, Sequence},
    error::WireError,
};

/// Role of a frame on the air.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum FrameKind {
    /// Application data or a fragment of it.
    Data,
    /// Unicast reply carrying a cumulative acknowledgement.
    Reply,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
struct WireHeader {
    kind: FrameKind,
    sender: u16,
    profile_id: u16,
    cluster_id: u16,
    source_endpoint: u8,
    destination_endpoint: u8,
    options: u16,
    group: u16,
    sequence: u8,
}

/// Decoded frame: who sent it, its envelope and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame role.
    pub kind: FrameKind,
    /// Originating node.
    pub sender: NodeId,
    /// Envelope with the group slot unpacked.
    pub envelope: Envelope,
    /// Payload bytes following the header.
    pub payload: Vec<u8>,
}

impl WireHeader {
    fn from_envelope(kind: FrameKind, sender: NodeId, envelope: &Envelope) -> Self {
        Self {
            kind,
            sender: sender.get(),
            profile_id: envelope.profile_id,
            cluster_id: envelope.cluster_id,
            source_endpoint: envelope.source_endpoint,
            destination_endpoint: envelope.destination_endpoint,
            options: envelope.options.bits(),
            group: envelope.group.to_wire(),
            sequence: envelope.sequence.get(),
        }
    }

    fn into_envelope(self) -> Envelope {
        let options = ApsOptions::from_bits(self.options);
        let group = match (self.kind, options.contains(ApsOptions::FRAGMENT)) {
            (FrameKind::Data, true) => GroupField::fragment_header_from_wire(self.group),
            (FrameKind::Reply, true) => GroupField::fragment_ack_from_wire(self.group),
            (_, false) => GroupField::Normal(self.group),
        };
        Envelope {
            profile_id: self.profile_id,
            cluster_id: self.cluster_id,
            source_endpoint: self.source_endpoint,
            destination_endpoint: self.destination_endpoint,
            options,
            group,
            sequence: Sequence::new(self.sequence),
        }
    }
}

/// Encode a frame for transmission.
///
/// # Errors
///
/// Returns [`WireError::Encode`] if the header cannot be serialised.
///
/// # Examples
///
/// ```
/// use meshfrag::{Envelope, GroupField, NodeId, decode_frame, encode_frame, wire::FrameKind};
/// let mut envelope = Envelope::new(0x0104, 0x0006);
/// envelope.options.insert(meshfrag::ApsOptions::FRAGMENT);
/// envelope.group = GroupField::FragmentHeader { count: 2, index: 1 };
/// let bytes = encode_frame(FrameKind::Data, NodeId::new(7), &envelope, b"tail")
///     .expect("encode frame");
/// let frame = decode_frame(&bytes).expect("decode frame");
/// assert_eq!(frame.envelope, envelope);
/// assert_eq!(frame.payload, b"tail");
/// ```
pub fn encode_frame(
    kind: FrameKind,
    sender: NodeId,
    envelope: &Envelope,
    payload: &[u8],
) -> Result<Vec<u8>, WireError> {
    let header = encode_to_vec(
        WireHeader::from_envelope(kind, sender, envelope),
        config::standard(),
    )?;
    let header_len = u16::try_from(header.len())
        .map_err(|_| EncodeError::Other("frame header length must fit within u16::MAX"))?;

    let mut buf = Vec::with_capacity(std::mem::size_of::<u16>() + header.len() + payload.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a frame produced by [`encode_frame`].
///
/// # Errors
///
/// Returns [`WireError::Decode`] when the buffer is truncated or the header
/// is malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, WireError> {
    let (len_bytes, rest) = bytes
        .split_first_chunk::<2>()
        .ok_or(DecodeError::UnexpectedEnd {
            additional: std::mem::size_of::<u16>().saturating_sub(bytes.len()),
        })?;
    let header_len = usize::from(u16::from_be_bytes(*len_bytes));
    let Some((header_bytes, payload)) = rest.split_at_checked(header_len) else {
        return Err(DecodeError::UnexpectedEnd {
            additional: header_len - rest.len(),
        }
        .into());
    };
    let (header, _): (WireHeader, usize) =
        decode_from_slice(header_bytes, config::standard())?;

    Ok(Frame {
        kind: header.kind,
        sender: NodeId::new(header.sender),
        envelope: header.into_envelope(),
        payload: payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_reply_keeps_packed_group() {
        let mut envelope = Envelope::new(0x0104, 0x0300);
        envelope.options.insert(ApsOptions::FRAGMENT);
        envelope.group = GroupField::FragmentAck {
            window_base: 4,
            mask: 0xF3,
        };
        let bytes =
            encode_frame(FrameKind::Reply, NodeId::new(1), &envelope, &[]).expect("encode");
        let frame = decode_frame(&bytes).expect("decode");
        assert_eq!(frame.kind, FrameKind::Reply);
        assert_eq!(frame.envelope.fragment_ack(), Some((4, 0xF3)));
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn unfragmented_frame_keeps_group_id() {
        let mut envelope = Envelope::new(0x0104, 0x0006);
        envelope.group = GroupField::Normal(0x1234);
        let bytes =
            encode_frame(FrameKind::Data, NodeId::new(2), &envelope, b"on").expect("encode");
        let frame = decode_frame(&bytes).expect("decode");
        assert_eq!(frame.envelope.group, GroupField::Normal(0x1234));
        assert_eq!(frame.sender, NodeId::new(2));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let envelope = Envelope::new(0x0104, 0x0006);
        let bytes =
            encode_frame(FrameKind::Data, NodeId::new(2), &envelope, b"").expect("encode");
        let truncated = bytes.get(..bytes.len() - 1).expect("non-empty frame");
        assert!(matches!(decode_frame(truncated), Err(WireError::Decode(_))));
        assert!(matches!(decode_frame(&[0]), Err(WireError::Decode(_))));
    }
}
