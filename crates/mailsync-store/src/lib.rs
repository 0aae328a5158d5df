//! # mailsync Store
//!
//! Transactional storage for mailsync endpoints. Provides a trait-based
//! interface over two logical tables (packets and lower bounds, plus the
//! sync cursors) with SQLite and in-memory implementations, and the bounds
//! algebra built on top of them.
//!
//! ## Overview
//!
//! Every access goes through [`Store::transact`], which begins a
//! transaction, hands the body a [`PacketTx`], and commits on `Ok` or rolls
//! back on `Err`. The [`BoundsExt`] extension trait layers lower/upper bound
//! computation and lower-bound advancement over any `PacketTx`, so both
//! backends share one implementation of the algebra.
//!
//! ## Key Types
//!
//! - [`Store`] - Transaction entry point
//! - [`PacketTx`] - Operations available inside a transaction
//! - [`BoundsExt`] - Lower bound, upper bound, next sequence number
//! - [`SqliteStore`] - SQLite-based persistent storage, partitioned by box id
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailsync_core::EndpointName;
//! use mailsync_store::{BoundsExt, SqliteStore, Store, StoreError};
//!
//! fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("boxes.db", "box-a")?;
//!     let a = EndpointName::new("a").unwrap();
//!     let b = EndpointName::new("b").unwrap();
//!
//!     let next = store.transact(|tx| tx.next_seq_number(&a, &b))?;
//!     println!("next sequence number for a->b: {next}");
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Duplicate keys**: `insert` fails with [`StoreError::DuplicateKey`];
//!   deciding whether that is a benign duplicate or a conflict is left to
//!   the endpoint.
//! - **Monotonic floors**: `update_lower_bound` ignores proposals that do not
//!   raise the current bound.
//! - **Box partitioning**: every row carries a box id so several endpoints
//!   can share one database file.

pub mod bounds;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use bounds::{BoundsExt, PacketBounds};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PacketTx, Store};
