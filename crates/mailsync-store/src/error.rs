//! Error types for the store module.

use mailsync_core::{EndpointName, SeqNumber};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A packet with the same key is already stored.
    #[error("duplicate packet key {src}->{dst} seq {seq}")]
    DuplicateKey {
        src: EndpointName,
        dst: EndpointName,
        seq: SeqNumber,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
