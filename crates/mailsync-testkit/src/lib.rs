//! # mailsync Testkit
//!
//! Testing utilities for mailsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Endpoints that record what they deliver, and chains of them
//! - **Generators**: Proptest strategies for names, sequence numbers and packets
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use mailsync_testkit::generators::{packet, seq_number};
//!
//! proptest! {
//!     #[test]
//!     fn hex_preserves_order(a in seq_number(), b in seq_number()) {
//!         prop_assert_eq!(a.cmp(&b), a.to_hex().cmp(&b.to_hex()));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use mailsync_testkit::fixtures::fixture_chain;
//! use mailsync_sync::{synchronize_forth_and_back, SyncConfig};
//!
//! async fn example() {
//!     let chain = fixture_chain(&["a", "b", "c"]);
//!     chain[0].send_numbered("c", 10).await;
//!
//!     let endpoints: Vec<_> = chain.iter().map(|f| &f.endpoint).collect();
//!     synchronize_forth_and_back(&endpoints, &SyncConfig::default()).await.unwrap();
//!     assert_eq!(chain[2].delivered().len(), 10);
//! }
//! ```

pub mod fixtures;
pub mod generators;

#[cfg(test)]
mod properties;

pub use fixtures::{fixture_chain, name, DeliveryRecorder, EndpointFixture};
pub use generators::{endpoint_name, packet, seq_number, PacketParams};
