//! The view a sync pass has of the peer it pulls from.

use async_trait::async_trait;

use mailsync_core::{Channel, EndpointName, Packet, PacketHeader, SeqNumber};
use mailsync_endpoint::Endpoint;
use mailsync_store::Store;

use crate::error::Result;

/// Read-only access to a peer's packets and bounds.
///
/// Implemented by [`Endpoint`] for peers in the same process and by
/// [`ChannelPeer`](crate::ChannelPeer) for peers behind a request channel.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    /// The peer's endpoint name. Sync cursors are keyed by it.
    fn name(&self) -> &EndpointName;

    /// Channels the peer holds packets or a lower bound for, sorted.
    async fn known_channels(&self) -> Result<Vec<Channel>>;

    /// The peer's lower bound of a channel.
    async fn lower_bound(&self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber>;

    /// Header of the peer's first packet on a channel with `seq >= cursor`.
    async fn first_header_at_or_after(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>>;

    /// A full packet by key.
    async fn get_packet(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>>;
}

#[async_trait]
impl<S: Store> RemotePeer for Endpoint<S> {
    fn name(&self) -> &EndpointName {
        Endpoint::name(self)
    }

    async fn known_channels(&self) -> Result<Vec<Channel>> {
        Ok(Endpoint::known_channels(self).await?)
    }

    async fn lower_bound(&self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        Ok(Endpoint::lower_bound(self, src, dst).await?)
    }

    async fn first_header_at_or_after(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>> {
        Ok(Endpoint::first_header_at_or_after(self, src, dst, cursor).await?)
    }

    async fn get_packet(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>> {
        Ok(Endpoint::get_packet(self, src, dst, seq).await?)
    }
}
