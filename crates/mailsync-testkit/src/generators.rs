//! Proptest generators for property-based testing.

use proptest::prelude::*;

use mailsync_core::{Channel, EndpointName, Label, Packet, SeqNumber};

/// Generate any sequence number.
pub fn seq_number() -> impl Strategy<Value = SeqNumber> {
    any::<u64>().prop_map(SeqNumber::new)
}

/// Generate a sequence number near the wall-clock range `send` produces.
pub fn clock_seq_number() -> impl Strategy<Value = SeqNumber> {
    (1_600_000_000_000u64..2_000_000_000_000u64, any::<u16>())
        .prop_map(|(millis, jitter)| SeqNumber::from_millis(millis, jitter))
}

/// Generate a valid endpoint name.
pub fn endpoint_name() -> impl Strategy<Value = EndpointName> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(|s| {
        EndpointName::new(s).unwrap_or_else(|e| panic!("generator produced {e}"))
    })
}

/// Generate a label, fragment labels included.
pub fn label() -> impl Strategy<Value = Label> {
    prop_oneof![
        4 => any::<u16>().prop_map(Label::new),
        1 => Just(Label::FIRST_FRAGMENT),
        1 => Just(Label::REMAINING_FRAGMENT),
    ]
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a channel between two distinct endpoints.
pub fn channel() -> impl Strategy<Value = Channel> {
    (endpoint_name(), endpoint_name())
        .prop_filter("src and dst must differ", |(src, dst)| src != dst)
        .prop_map(|(src, dst)| Channel::new(src, dst))
}

/// Generate a packet.
pub fn packet() -> impl Strategy<Value = Packet> {
    any::<PacketParams>().prop_map(|params| params.into_packet())
}

/// Parameters for generating a packet.
#[derive(Debug, Clone)]
pub struct PacketParams {
    pub channel: Channel,
    pub seq_number: SeqNumber,
    pub label: Label,
    pub payload: Vec<u8>,
}

impl PacketParams {
    pub fn into_packet(self) -> Packet {
        Packet::new(
            self.channel.src,
            self.channel.dst,
            self.seq_number,
            self.label,
            self.payload,
        )
    }
}

impl Arbitrary for PacketParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (channel(), clock_seq_number(), label(), payload(256))
            .prop_map(|(channel, seq_number, label, payload)| PacketParams {
                channel,
                seq_number,
                label,
                payload,
            })
            .boxed()
    }
}
