//! # mailsync Endpoint
//!
//! A named mailbox that originates, receives, retains and forwards addressed
//! packets.
//!
//! ## Key Concepts
//!
//! - **Sending** assigns the next sequence number of the `(self, dst)`
//!   channel. Batches on one channel are numbered contiguously.
//! - **Relaying**: a packet addressed to someone else is stored until its
//!   channel's lower bound passes it.
//! - **Delivery**: a packet addressed to this endpoint runs the registered
//!   handlers and is consumed by raising the lower bound. It is never stored.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailsync_core::{EndpointName, Label};
//! use mailsync_endpoint::{Endpoint, EndpointConfig};
//! use mailsync_store::MemoryStore;
//!
//! async fn example() -> mailsync_endpoint::Result<()> {
//!     let name = EndpointName::new("a").unwrap();
//!     let a = Endpoint::new(name, MemoryStore::new("a"), EndpointConfig::default());
//!
//!     a.send(EndpointName::new("b")?, Label(1), b"hello".to_vec()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod handler;

pub use config::{EndpointConfig, FragmentProtection, DEFAULT_MTU};
pub use endpoint::{with_endpoint, Endpoint, EndpointSnapshot, PutOutcome, RangeSpec};
pub use error::{EndpointError, Result};
pub use handler::{EndpointInfo, HandlerError, LargePacketSender, PacketHandler};
