//! Request/response transport over tokio channels.
//!
//! [`serve_endpoint`] spawns a task that answers [`PeerRequest`]s from a
//! [`RemotePeer`], one at a time, and returns a [`ChannelPeer`] handle that
//! forwards its calls to that task. The handle is itself a `RemotePeer`, so
//! a sync pass cannot tell it from an in-process endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mailsync_core::{Channel, EndpointName, Packet, PacketHeader, SeqNumber};

use crate::error::{Result, SyncError};
use crate::messages::{PeerRequest, PeerResponse};
use crate::remote::RemotePeer;

/// Requests queued before callers start waiting.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// How long a call waits for its answer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Envelope {
    request: PeerRequest,
    reply: oneshot::Sender<PeerResponse>,
}

/// Handle to a peer served by [`serve_endpoint`].
#[derive(Clone)]
pub struct ChannelPeer {
    name: EndpointName,
    requests: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl ChannelPeer {
    /// Set how long a call waits for its answer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(&self, request: PeerRequest) -> Result<PeerResponse> {
        let kind = request.kind();
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| SyncError::PeerClosed(self.name.clone()))?;

        let response = match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(SyncError::PeerClosed(self.name.clone())),
            Err(_) => {
                return Err(SyncError::Transport(format!(
                    "{} request to {} timed out after {:?}",
                    kind, self.name, self.timeout
                )))
            }
        };

        match response {
            PeerResponse::Error(message) => Err(SyncError::Remote {
                peer: self.name.clone(),
                message,
            }),
            other => Ok(other),
        }
    }

    fn unexpected(&self, kind: &str, response: PeerResponse) -> SyncError {
        SyncError::Transport(format!(
            "unexpected response from {} to {}: {:?}",
            self.name, kind, response
        ))
    }
}

#[async_trait]
impl RemotePeer for ChannelPeer {
    fn name(&self) -> &EndpointName {
        &self.name
    }

    async fn known_channels(&self) -> Result<Vec<Channel>> {
        match self.call(PeerRequest::KnownChannels).await? {
            PeerResponse::Channels(channels) => Ok(channels),
            other => Err(self.unexpected("known_channels", other)),
        }
    }

    async fn lower_bound(&self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        let request = PeerRequest::LowerBound {
            src: src.clone(),
            dst: dst.clone(),
        };
        match self.call(request).await? {
            PeerResponse::LowerBound(lb) => Ok(lb),
            other => Err(self.unexpected("lower_bound", other)),
        }
    }

    async fn first_header_at_or_after(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>> {
        let request = PeerRequest::FirstHeaderAtOrAfter {
            src: src.clone(),
            dst: dst.clone(),
            cursor,
        };
        match self.call(request).await? {
            PeerResponse::Header(header) => Ok(header),
            other => Err(self.unexpected("first_header_at_or_after", other)),
        }
    }

    async fn get_packet(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>> {
        let request = PeerRequest::GetPacket {
            src: src.clone(),
            dst: dst.clone(),
            seq,
        };
        match self.call(request).await? {
            PeerResponse::Packet(packet) => Ok(packet),
            other => Err(self.unexpected("get_packet", other)),
        }
    }
}

/// Answer one request from `peer`.
pub async fn respond<P: RemotePeer + ?Sized>(peer: &P, request: PeerRequest) -> PeerResponse {
    let result = match request {
        PeerRequest::KnownChannels => peer.known_channels().await.map(PeerResponse::Channels),
        PeerRequest::LowerBound { src, dst } => peer
            .lower_bound(&src, &dst)
            .await
            .map(PeerResponse::LowerBound),
        PeerRequest::FirstHeaderAtOrAfter { src, dst, cursor } => peer
            .first_header_at_or_after(&src, &dst, cursor)
            .await
            .map(PeerResponse::Header),
        PeerRequest::GetPacket { src, dst, seq } => peer
            .get_packet(&src, &dst, seq)
            .await
            .map(PeerResponse::Packet),
    };
    result.unwrap_or_else(|e| PeerResponse::Error(e.to_string()))
}

/// Serve `peer` on a background task.
///
/// Requests are answered in arrival order. The task exits once every
/// [`ChannelPeer`] clone has been dropped. Must be called from inside a
/// tokio runtime.
pub fn serve_endpoint<P>(peer: Arc<P>) -> (ChannelPeer, JoinHandle<()>)
where
    P: RemotePeer + 'static,
{
    let (requests, mut inbox) = mpsc::channel::<Envelope>(DEFAULT_QUEUE_DEPTH);
    let name = peer.name().clone();

    let task = tokio::spawn(async move {
        while let Some(Envelope { request, reply }) = inbox.recv().await {
            let kind = request.kind();
            let response = respond(peer.as_ref(), request).await;
            if reply.send(response).is_err() {
                tracing::debug!(peer = %peer.name(), request = kind, "caller went away before reply");
            }
        }
        tracing::debug!(peer = %peer.name(), "peer server stopped");
    });

    let handle = ChannelPeer {
        name,
        requests,
        timeout: DEFAULT_REQUEST_TIMEOUT,
    };
    (handle, task)
}
