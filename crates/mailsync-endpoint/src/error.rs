//! Error types for endpoint operations.

use std::path::PathBuf;

use mailsync_core::{CoreError, EndpointName, SeqNumber};
use mailsync_store::StoreError;
use thiserror::Error;

use crate::handler::HandlerError;

/// Errors that can occur during endpoint operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Invalid identifier, sequence number or packet draft.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A different packet is already stored under this key.
    #[error("conflicting packet for {src}->{dst} seq {seq}")]
    Conflict {
        src: EndpointName,
        dst: EndpointName,
        seq: SeqNumber,
    },

    /// A packet handler or the large-packet sender failed.
    #[error("packet handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// Payload exceeds the MTU and no large-packet sender is configured.
    #[error("packet of {size} bytes exceeds MTU of {mtu} bytes")]
    PacketTooLarge { size: usize, mtu: usize },

    /// Packet not found.
    #[error("packet not found: {0}")]
    NotFound(String),

    /// No endpoint name can be derived from a database path.
    #[error("cannot derive an endpoint name from {0}")]
    Naming(PathBuf),

    /// The endpoint has been closed.
    #[error("endpoint {0} is closed")]
    Closed(EndpointName),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for endpoint operations.
pub type Result<T> = std::result::Result<T, EndpointError>;
