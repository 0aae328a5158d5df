//! # mailsync
//!
//! Store-and-forward packet replication between named mailboxes.
//!
//! ## Overview
//!
//! mailsync moves addressed packets across a network of endpoints that
//! only meet pairwise and intermittently:
//!
//! - **Packets**: Immutable, keyed by `(src, dst, seq)`
//! - **Endpoints**: Named mailboxes that send, relay and deliver packets
//! - **Bounds**: Per-channel lower and upper bounds that make delivery
//!   exactly-once and let relays forget what has been consumed
//! - **Sync**: An anti-entropy pull that converges two endpoints
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailsync::{Endpoint, EndpointConfig, EndpointName, Label};
//! use mailsync::store::MemoryStore;
//! use mailsync::sync::{synchronize_forth_and_back, SyncConfig};
//!
//! async fn example() -> mailsync::Result<()> {
//!     let a = Endpoint::new(EndpointName::new("a")?, MemoryStore::new("a"), EndpointConfig::default());
//!     let b = Endpoint::new(EndpointName::new("b")?, MemoryStore::new("b"), EndpointConfig::default());
//!     let c = Endpoint::new(EndpointName::new("c")?, MemoryStore::new("c"), EndpointConfig::default());
//!
//!     a.send(EndpointName::new("c")?, Label(1), b"hello".to_vec()).await?;
//!     synchronize_forth_and_back(&[&a, &b, &c], &SyncConfig::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `mailsync::core` - Sequence numbers, packets, names, channels
//! - `mailsync::store` - Storage abstraction, SQLite and memory backends
//! - `mailsync::endpoint` - The mailbox
//! - `mailsync::sync` - Sync protocol and transports

pub mod error;
pub mod simulation;

// Re-export component crates
pub use mailsync_core as core;
pub use mailsync_endpoint as endpoint;
pub use mailsync_store as store;
pub use mailsync_sync as sync;

// Re-export main types for convenience
pub use error::{MailsyncError, Result};
pub use simulation::{
    memory_chain, run_simulation, sqlite_chain, SimulationConfig, SimulationOutcome,
};

pub use mailsync_core::{Channel, EndpointName, Label, Packet, PacketDraft, PacketHeader, SeqNumber};
pub use mailsync_endpoint::{Endpoint, EndpointConfig, EndpointSnapshot, PutOutcome};
pub use mailsync_sync::{pull, synchronize, SyncConfig, SyncReport};
