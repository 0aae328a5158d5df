//! Extension points: packet handlers and the large-packet sender.

use bytes::Bytes;
use thiserror::Error;

use mailsync_core::{EndpointName, Label, Packet, PacketDraft};

/// What a handler may know about the endpoint it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub name: EndpointName,
    pub is_leaf: bool,
}

/// Failure reported by a handler. Aborts the delivery transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Called for every packet delivered to its destination endpoint.
///
/// Handlers run inside the delivery transaction, in registration order. An
/// error rolls the delivery back, so the packet stays admissible and will be
/// offered again by the next sync.
///
/// Any `Fn(&EndpointInfo, &Packet) -> Result<(), HandlerError>` closure is a
/// handler.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, endpoint: &EndpointInfo, packet: &Packet) -> Result<(), HandlerError>;
}

impl<F> PacketHandler for F
where
    F: Fn(&EndpointInfo, &Packet) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, endpoint: &EndpointInfo, packet: &Packet) -> Result<(), HandlerError> {
        self(endpoint, packet)
    }
}

/// Splits payloads larger than the MTU into packets that fit.
///
/// The endpoint sends the returned drafts as one batch, so the pieces get
/// contiguous sequence numbers on the `(sender, dst)` channel. By convention
/// the first piece is labelled [`Label::FIRST_FRAGMENT`] and the rest
/// [`Label::REMAINING_FRAGMENT`].
pub trait LargePacketSender: Send + Sync {
    fn split(
        &self,
        from: &EndpointInfo,
        dst: &EndpointName,
        label: Label,
        data: Bytes,
        mtu: usize,
    ) -> Result<Vec<PacketDraft>, HandlerError>;
}
