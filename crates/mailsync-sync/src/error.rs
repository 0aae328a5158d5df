//! Error types for the sync module.

use mailsync_core::EndpointName;
use mailsync_endpoint::EndpointError;
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local endpoint operation failed.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer stopped serving requests.
    #[error("peer {0} closed the connection")]
    PeerClosed(EndpointName),

    /// The peer answered with an error.
    #[error("peer {peer} failed: {message}")]
    Remote { peer: EndpointName, message: String },
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
