//! Request and response messages for peers behind a channel.
//!
//! One request per [`RemotePeer`](crate::RemotePeer) method. The types are
//! serde-serializable so a network transport can carry them unchanged.

use serde::{Deserialize, Serialize};

use mailsync_core::{Channel, EndpointName, Packet, PacketHeader, SeqNumber};

/// A question asked of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRequest {
    KnownChannels,
    LowerBound {
        src: EndpointName,
        dst: EndpointName,
    },
    FirstHeaderAtOrAfter {
        src: EndpointName,
        dst: EndpointName,
        cursor: SeqNumber,
    },
    GetPacket {
        src: EndpointName,
        dst: EndpointName,
        seq: SeqNumber,
    },
}

impl PeerRequest {
    /// Short name for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerRequest::KnownChannels => "known_channels",
            PeerRequest::LowerBound { .. } => "lower_bound",
            PeerRequest::FirstHeaderAtOrAfter { .. } => "first_header_at_or_after",
            PeerRequest::GetPacket { .. } => "get_packet",
        }
    }
}

/// A peer's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerResponse {
    Channels(Vec<Channel>),
    LowerBound(SeqNumber),
    Header(Option<PacketHeader>),
    Packet(Option<Packet>),
    /// The peer failed to answer; carries its error message.
    Error(String),
}
