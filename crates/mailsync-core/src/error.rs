//! Error types for mailsync core.

use thiserror::Error;

use crate::seq::SeqNumber;

/// Errors from constructing or parsing core values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Endpoint name is empty, too long, or uses a forbidden character.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Sequence number encoding is not 16 hex digits.
    #[error("invalid sequence number: {0:?}")]
    InvalidSeqNumber(String),

    /// The sequence number is reserved and cannot label a packet.
    #[error("sequence number {0} is reserved")]
    ReservedSeqNumber(SeqNumber),

    /// A packet draft is missing a required field.
    #[error("incomplete packet: missing {0}")]
    IncompletePacket(&'static str),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
