//! Packets: addressed, immutable units of data.
//!
//! A packet is identified by `(src, dst, seq_number)`. Once stored it is
//! never modified; two packets sharing a key must be identical.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::error::{CoreError, Result};
use crate::seq::SeqNumber;
use crate::types::EndpointName;

/// Tag classifying a packet's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label(pub u16);

impl Label {
    /// First fragment of a packet larger than the MTU.
    pub const FIRST_FRAGMENT: Self = Self(0xFF01);
    /// Any following fragment of a packet larger than the MTU.
    pub const REMAINING_FRAGMENT: Self = Self(0xFF02);

    /// Labels that must survive lower-bound eviction while a large packet is
    /// being reassembled.
    pub const FRAGMENTS: [Self; 2] = [Self::FIRST_FRAGMENT, Self::REMAINING_FRAGMENT];

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    /// Check if this is one of the reserved fragmentation labels.
    pub fn is_fragment(self) -> bool {
        Self::FRAGMENTS.contains(&self)
    }
}

impl From<u16> for Label {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// The key fields of a packet, without its payload.
///
/// This is what the sync protocol fetches first to decide whether the full
/// packet is worth transferring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketHeader {
    pub src: EndpointName,
    pub dst: EndpointName,
    pub seq_number: SeqNumber,
    pub label: Label,
}

impl PacketHeader {
    pub fn channel(&self) -> Channel {
        Channel::new(self.src.clone(), self.dst.clone())
    }
}

/// A stored or in-flight packet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Packet {
    pub src: EndpointName,
    pub dst: EndpointName,
    pub seq_number: SeqNumber,
    pub label: Label,
    pub data: Bytes,
}

impl Packet {
    pub fn new(
        src: EndpointName,
        dst: EndpointName,
        seq_number: SeqNumber,
        label: Label,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            src,
            dst,
            seq_number,
            label,
            data: data.into(),
        }
    }

    /// The light form of this packet.
    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            src: self.src.clone(),
            dst: self.dst.clone(),
            seq_number: self.seq_number,
            label: self.label,
        }
    }

    pub fn channel(&self) -> Channel {
        Channel::new(self.src.clone(), self.dst.clone())
    }

    /// Check whether `other` has the same `(src, dst, seq_number)` key.
    pub fn same_key(&self, other: &Packet) -> bool {
        self.src == other.src && self.dst == other.dst && self.seq_number == other.seq_number
    }
}

/// Builder for an outgoing packet.
///
/// The sender fills in `dst`, `label` and `data`; the endpoint assigns `src`
/// and the sequence number when the draft is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketDraft {
    dst: Option<EndpointName>,
    label: Option<Label>,
    data: Option<Bytes>,
}

impl PacketDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// A draft with every field set.
    pub fn complete(dst: EndpointName, label: Label, data: impl Into<Bytes>) -> Self {
        Self::new().dst(dst).label(label).data(data)
    }

    pub fn dst(mut self, dst: EndpointName) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Split into its fields, failing if any is missing.
    pub fn into_parts(self) -> Result<(EndpointName, Label, Bytes)> {
        let dst = self.dst.ok_or(CoreError::IncompletePacket("dst"))?;
        let label = self.label.ok_or(CoreError::IncompletePacket("label"))?;
        let data = self.data.ok_or(CoreError::IncompletePacket("data"))?;
        Ok((dst, label, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> EndpointName {
        EndpointName::new(s).unwrap()
    }

    #[test]
    fn test_header_drops_payload() {
        let p = Packet::new(name("a"), name("b"), SeqNumber::new(7), Label(1), vec![1, 2, 3]);
        let h = p.header();
        assert_eq!(h.src, "a");
        assert_eq!(h.dst, "b");
        assert_eq!(h.seq_number, SeqNumber::new(7));
        assert_eq!(h.channel(), p.channel());
    }

    #[test]
    fn test_same_key_ignores_payload() {
        let p1 = Packet::new(name("a"), name("b"), SeqNumber::new(7), Label(1), vec![1]);
        let p2 = Packet::new(name("a"), name("b"), SeqNumber::new(7), Label(2), vec![2]);
        assert!(p1.same_key(&p2));
        assert_ne!(p1, p2);
    }

    #[test]
    fn test_fragment_labels() {
        assert!(Label::FIRST_FRAGMENT.is_fragment());
        assert!(Label::REMAINING_FRAGMENT.is_fragment());
        assert!(!Label(0).is_fragment());
    }

    #[test]
    fn test_draft_reports_missing_field() {
        let draft = PacketDraft::new().dst(name("b")).data(vec![0u8]);
        assert_eq!(draft.into_parts(), Err(CoreError::IncompletePacket("label")));

        let draft = PacketDraft::new().label(Label(3));
        assert_eq!(draft.into_parts(), Err(CoreError::IncompletePacket("dst")));
    }

    #[test]
    fn test_complete_draft() {
        let (dst, label, data) = PacketDraft::complete(name("b"), Label(3), vec![9u8])
            .into_parts()
            .unwrap();
        assert_eq!(dst, "b");
        assert_eq!(label, Label(3));
        assert_eq!(&data[..], &[9u8]);
    }
}
