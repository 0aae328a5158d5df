//! # mailsync Sync
//!
//! Anti-entropy synchronization between mailsync endpoints.
//!
//! ## Overview
//!
//! A [`pull`] makes the local endpoint fetch, channel by channel and in
//! sequence order, every packet of a remote peer it would still admit.
//! [`synchronize`] pulls in both directions; chains of relays are handled
//! by [`synchronize_chain`] and [`synchronize_forth_and_back`].
//!
//! ## Key Properties
//!
//! - **Idempotent**: replays are absorbed by `put_packet`
//! - **Resumable**: per-peer, per-channel cursors survive interruption
//! - **Bandwidth-aware**: headers first, payloads only when admissible
//! - **Garbage collecting**: lower bounds flow back from destinations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailsync_endpoint::{Endpoint, EndpointConfig};
//! use mailsync_store::MemoryStore;
//! use mailsync_sync::{synchronize, SyncConfig};
//! use mailsync_core::EndpointName;
//!
//! async fn example() -> mailsync_sync::Result<()> {
//!     let a = Endpoint::new(EndpointName::new("a").unwrap(), MemoryStore::new("a"), EndpointConfig::default());
//!     let b = Endpoint::new(EndpointName::new("b").unwrap(), MemoryStore::new("b"), EndpointConfig::default());
//!
//!     let report = synchronize(&a, &b, &SyncConfig::default()).await?;
//!     println!("delivered {} packets", report.delivered);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Local                                Remote
//!   |---- known_channels ------------->|
//!   |---- lower_bound(src, dst) ------>|   adopt if higher
//!   |---- first_header_at_or_after --->|
//!   |<--- header (or none: done) ------|
//!   |---- get_packet (if admissible) ->|
//!   |<--- packet ----------------------|   put_packet, advance cursor
//! ```

pub mod error;
pub mod messages;
pub mod protocol;
pub mod remote;
pub mod transport;

pub use error::{Result, SyncError};
pub use messages::{PeerRequest, PeerResponse};
pub use protocol::{
    pull, synchronize, synchronize_chain, synchronize_forth_and_back, SyncConfig, SyncReport,
};
pub use remote::RemotePeer;
pub use transport::{respond, serve_endpoint, ChannelPeer};
