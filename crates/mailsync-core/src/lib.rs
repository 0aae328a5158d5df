//! # mailsync Core
//!
//! Pure primitives for mailsync: sequence numbers, packets and endpoint names.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`SeqNumber`] - Fixed-width, lexicographically ordered sequence number
//! - [`Packet`] - An addressed, immutable unit of data
//! - [`PacketHeader`] - The light form of a packet, without payload
//! - [`PacketDraft`] - Builder for outgoing packets (no src/seq yet)
//! - [`EndpointName`] - Validated endpoint identifier
//! - [`Channel`] - A `(src, dst)` pair
//!
//! ## Ordering
//!
//! Sequence numbers encode as 16 lowercase hex digits, so ordering the
//! encoded strings and ordering the numbers agree. See [`seq`].

pub mod channel;
pub mod error;
pub mod naming;
pub mod packet;
pub mod seq;
pub mod types;

pub use channel::{
    channel_difference, channel_intersection, channel_union, filter_by_name, Channel,
};
pub use error::{CoreError, Result};
pub use naming::endpoint_name_from_path;
pub use packet::{Label, Packet, PacketDraft, PacketHeader};
pub use seq::SeqNumber;
pub use types::{EndpointName, MAX_NAME_LEN};
