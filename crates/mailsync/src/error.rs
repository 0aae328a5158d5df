//! Error types for mailsync.

use mailsync_core::CoreError;
use mailsync_endpoint::EndpointError;
use mailsync_store::StoreError;
use mailsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur anywhere in mailsync.
#[derive(Debug, Error)]
pub enum MailsyncError {
    /// Malformed name, sequence number or packet.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Endpoint error.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error outside the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for mailsync operations.
pub type Result<T> = std::result::Result<T, MailsyncError>;
