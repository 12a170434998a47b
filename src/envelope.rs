//! Protocol metadata carried alongside every message.
//!
//! An [`Envelope`] holds addressing, cluster and profile identifiers, option
//! flags and the per-message sequence number. It is copied, never aliased,
//! between transfer records and transport calls.
//!
//! The radio frame reuses one 16-bit field for three meanings: an
//! ordinary multicast group id, the `(count, index)` header of an outgoing
//! fragment, and the `(window base, mask)` of a cumulative acknowledgement.
//! [`GroupField`] keeps those meanings apart and only packs them into a
//! `u16` at the wire boundary.

use bincode::{Decode, Encode};
use derive_more::{Display, From, Into};

/// Short network address of a peer.
///
/// # Examples
///
/// ```
/// use meshfrag::NodeId;
/// let node = NodeId::new(0x1234);
/// assert_eq!(node.get(), 0x1234);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode, Display, From, Into)]
#[display("0x{_0:04X}")]
pub struct NodeId(u16);

impl NodeId {
    /// Create a node identifier.
    #[must_use]
    pub const fn new(value: u16) -> Self { Self(value) }

    /// Return the raw short address.
    #[must_use]
    pub const fn get(self) -> u16 { self.0 }
}

/// Sequence number assigned once per logical message.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Display, From, Into,
)]
#[display("{_0}")]
pub struct Sequence(u8);

impl Sequence {
    /// Create a sequence number.
    #[must_use]
    pub const fn new(value: u8) -> Self { Self(value) }

    /// Return the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u8 { self.0 }

    /// Return the following sequence number, wrapping at `u8::MAX`.
    #[must_use]
    pub const fn next(self) -> Self { Self(self.0.wrapping_add(1)) }
}

/// Option bits carried by an [`Envelope`].
///
/// # Examples
///
/// ```
/// use meshfrag::ApsOptions;
/// let mut options = ApsOptions::empty();
/// options.insert(ApsOptions::FRAGMENT);
/// assert!(options.contains(ApsOptions::FRAGMENT));
/// assert!(!options.contains(ApsOptions::RETRY));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct ApsOptions(u16);

impl ApsOptions {
    /// The transport retries the unicast until acknowledged.
    pub const RETRY: Self = Self(0x0040);
    /// The message is one fragment of a larger payload.
    pub const FRAGMENT: Self = Self(0x8000);

    /// No options set.
    #[must_use]
    pub const fn empty() -> Self { Self(0) }

    /// Build a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self { Self(bits) }

    /// Return the raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 { self.0 }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) { self.0 |= other.0; }

    /// Clear the bits of `other`.
    pub fn remove(&mut self, other: Self) { self.0 &= !other.0; }
}

/// Meaning of the envelope's shared 16-bit group slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum GroupField {
    /// Ordinary multicast group id (zero for unicasts).
    Normal(u16),
    /// Outgoing fragment: total fragment count and this fragment's index.
    FragmentHeader {
        /// Fragments making up the whole message.
        count: u8,
        /// Zero-based index of this fragment.
        index: u8,
    },
    /// Cumulative acknowledgement of the receiver's current window.
    FragmentAck {
        /// First fragment index of the acknowledged window.
        window_base: u8,
        /// Bit `i` set when fragment `window_base + i` has arrived.
        mask: u8,
    },
}

impl Default for GroupField {
    fn default() -> Self { Self::Normal(0) }
}

impl GroupField {
    /// Pack into the 16-bit layout used on the air.
    ///
    /// # Examples
    ///
    /// ```
    /// use meshfrag::GroupField;
    /// let header = GroupField::FragmentHeader { count: 3, index: 1 };
    /// assert_eq!(header.to_wire(), 0x0301);
    /// let ack = GroupField::FragmentAck { window_base: 4, mask: 0xFF };
    /// assert_eq!(ack.to_wire(), 0x04FF);
    /// ```
    #[must_use]
    pub const fn to_wire(self) -> u16 {
        match self {
            Self::Normal(group) => group,
            Self::FragmentHeader { count, index } => u16::from_be_bytes([count, index]),
            Self::FragmentAck { window_base, mask } => u16::from_be_bytes([window_base, mask]),
        }
    }

    /// Interpret a packed value as a fragment header.
    #[must_use]
    pub const fn fragment_header_from_wire(raw: u16) -> Self {
        let [count, index] = raw.to_be_bytes();
        Self::FragmentHeader { count, index }
    }

    /// Interpret a packed value as a cumulative acknowledgement.
    #[must_use]
    pub const fn fragment_ack_from_wire(raw: u16) -> Self {
        let [window_base, mask] = raw.to_be_bytes();
        Self::FragmentAck { window_base, mask }
    }
}

/// Protocol metadata accompanying a message, excluding payload bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Envelope {
    /// Application profile identifier.
    pub profile_id: u16,
    /// Cluster identifier within the profile.
    pub cluster_id: u16,
    /// Endpoint the message leaves from.
    pub source_endpoint: u8,
    /// Endpoint the message is routed to.
    pub destination_endpoint: u8,
    /// Option flags.
    pub options: ApsOptions,
    /// Shared group slot; see [`GroupField`].
    pub group: GroupField,
    /// Sequence number of the logical message.
    pub sequence: Sequence,
}

impl Envelope {
    /// Create a unicast envelope for `profile_id`/`cluster_id`.
    #[must_use]
    pub fn new(profile_id: u16, cluster_id: u16) -> Self {
        Self {
            profile_id,
            cluster_id,
            ..Self::default()
        }
    }

    /// Whether the envelope describes a fragment of a larger message.
    #[must_use]
    pub const fn is_fragmented(&self) -> bool { self.options.contains(ApsOptions::FRAGMENT) }

    /// Return the `(count, index)` pair of a fragment envelope.
    #[must_use]
    pub const fn fragment_header(&self) -> Option<(u8, u8)> {
        match self.group {
            GroupField::FragmentHeader { count, index } => Some((count, index)),
            _ => None,
        }
    }

    /// Return the `(window base, mask)` pair of an acknowledgement envelope.
    #[must_use]
    pub const fn fragment_ack(&self) -> Option<(u8, u8)> {
        match self.group {
            GroupField::FragmentAck { window_base, mask } => Some((window_base, mask)),
            _ => None,
        }
    }
}

/// Where an outgoing transfer is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Destination {
    /// A peer addressed by its short id.
    #[display("node {_0}")]
    Direct(NodeId),
    /// An entry of the stack's address table.
    #[display("address table entry {_0}")]
    AddressTable(u8),
    /// An entry of the stack's binding table.
    #[display("binding {_0}")]
    Binding(u8),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(GroupField::FragmentHeader { count: 0xFF, index: 0 }, 0xFF00)]
    #[case(GroupField::FragmentHeader { count: 2, index: 1 }, 0x0201)]
    #[case(GroupField::FragmentAck { window_base: 8, mask: 0x0F }, 0x080F)]
    #[case(GroupField::Normal(0xBEEF), 0xBEEF)]
    fn group_field_packs_high_then_low_byte(#[case] field: GroupField, #[case] raw: u16) {
        assert_eq!(field.to_wire(), raw);
    }

    #[test]
    fn packed_fragment_header_unpacks() {
        assert_eq!(
            GroupField::fragment_header_from_wire(0x0502),
            GroupField::FragmentHeader { count: 5, index: 2 }
        );
        assert_eq!(
            GroupField::fragment_ack_from_wire(0x0203),
            GroupField::FragmentAck {
                window_base: 2,
                mask: 3
            }
        );
    }

    #[test]
    fn options_insert_and_remove() {
        let mut options = ApsOptions::from_bits(0x0001);
        options.insert(ApsOptions::FRAGMENT);
        options.insert(ApsOptions::RETRY);
        assert!(options.contains(ApsOptions::FRAGMENT));
        options.remove(ApsOptions::RETRY);
        assert!(!options.contains(ApsOptions::RETRY));
        assert_eq!(options.bits(), 0x8001);
    }

    #[test]
    fn sequence_wraps() {
        assert_eq!(Sequence::new(u8::MAX).next(), Sequence::new(0));
    }

    #[test]
    fn header_accessors_follow_variant() {
        let mut envelope = Envelope::new(0x0104, 0x0006);
        assert_eq!(envelope.fragment_header(), None);
        envelope.group = GroupField::FragmentHeader { count: 4, index: 3 };
        assert_eq!(envelope.fragment_header(), Some((4, 3)));
        assert_eq!(envelope.fragment_ack(), None);
    }
}
