//! The Endpoint: a named mailbox over a packet store.
//!
//! Each public operation is one store transaction, run on the blocking pool
//! via `tokio::task::spawn_blocking`. Admission, deduplication and delivery
//! in [`Endpoint::put_packet`] therefore see a consistent store even when
//! several tasks share the endpoint.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use mailsync_core::{
    channel_union, endpoint_name_from_path, Channel, CoreError, EndpointName, Label, Packet,
    PacketDraft, PacketHeader, SeqNumber,
};
use mailsync_store::{BoundsExt, PacketBounds, PacketTx, SqliteStore, Store, StoreError};

use crate::config::EndpointConfig;
use crate::error::{EndpointError, Result};
use crate::handler::{EndpointInfo, LargePacketSender, PacketHandler};

/// What [`Endpoint::put_packet`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Below the channel's lower bound. Nothing happened.
    Obsolete,
    /// Addressed to this endpoint: handlers ran and the lower bound moved
    /// past it.
    Delivered,
    /// Stored for forwarding.
    Stored,
    /// An identical packet was already stored.
    Duplicate,
}

/// A half-open sequence range on one channel, for [`Endpoint::range_sizes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub channel: Channel,
    pub lower: SeqNumber,
    pub upper: SeqNumber,
}

/// Everything an endpoint holds, for debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub name: EndpointName,
    pub packets: Vec<Packet>,
    pub lower_bounds: Vec<(Channel, SeqNumber)>,
}

/// A named, persistently backed mailbox.
///
/// Originates packets with [`send`](Self::send), accepts packets from peers
/// with [`put_packet`](Self::put_packet), and keeps the per-channel bounds
/// the sync protocol walks.
pub struct Endpoint<S: Store> {
    info: EndpointInfo,
    /// `None` once closed.
    store: RwLock<Option<Arc<S>>>,
    config: EndpointConfig,
    handlers: Vec<Arc<dyn PacketHandler>>,
    large_sender: Option<Arc<dyn LargePacketSender>>,
}

impl<S: Store> Endpoint<S> {
    /// Create an endpoint over an opened store.
    pub fn new(name: EndpointName, store: S, config: EndpointConfig) -> Self {
        Self {
            info: EndpointInfo {
                name,
                is_leaf: config.is_leaf,
            },
            store: RwLock::new(Some(Arc::new(store))),
            config,
            handlers: Vec::new(),
            large_sender: None,
        }
    }

    pub fn name(&self) -> &EndpointName {
        &self.info.name
    }

    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn is_leaf(&self) -> bool {
        self.info.is_leaf
    }

    pub fn set_is_leaf(&mut self, is_leaf: bool) {
        self.info.is_leaf = is_leaf;
        self.config.is_leaf = is_leaf;
    }

    /// Append a handler. Handlers run in the order they were added.
    pub fn add_packet_handler(&mut self, handler: impl PacketHandler + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn set_large_packet_sender(&mut self, sender: impl LargePacketSender + 'static) {
        self.large_sender = Some(Arc::new(sender));
    }

    fn store(&self) -> Result<Arc<S>> {
        let guard = self
            .store
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        guard
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| EndpointError::Closed(self.info.name.clone()))
    }

    /// Run `f` in one transaction on the blocking pool.
    async fn transact<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn PacketTx) -> Result<T> + Send + 'static,
    {
        let store = self.store()?;
        tokio::task::spawn_blocking(move || store.transact(f)).await?
    }

    fn protected_labels(&self, dst: &EndpointName) -> &'static [Label] {
        self.config
            .fragment_protection
            .protected_labels(dst == &self.info.name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Send one packet per item, all in one transaction.
    ///
    /// `generator` sees the packets sent so far in this batch and the current
    /// item, and returns the draft to send. Each packet gets this endpoint
    /// as `src` and the next sequence number of its channel, so a batch on
    /// one channel is numbered contiguously.
    pub async fn send_batch<I, G>(&self, items: Vec<I>, mut generator: G) -> Result<Vec<Packet>>
    where
        I: Send + 'static,
        G: FnMut(&[Packet], &I) -> PacketDraft + Send + 'static,
    {
        let src = self.info.name.clone();
        let mtu = self.config.mtu;

        let sent = self
            .transact(move |tx| {
                let mut sent: Vec<Packet> = Vec::with_capacity(items.len());
                for item in &items {
                    let (dst, label, data) = generator(&sent, item).into_parts()?;
                    if data.len() > mtu {
                        return Err(EndpointError::PacketTooLarge {
                            size: data.len(),
                            mtu,
                        });
                    }
                    let seq = tx.next_seq_number(&src, &dst)?;
                    if !seq.is_assignable() {
                        return Err(CoreError::ReservedSeqNumber(seq).into());
                    }
                    let packet = Packet::new(src.clone(), dst, seq, label, data);
                    tx.insert(&packet)?;
                    sent.push(packet);
                }
                Ok(sent)
            })
            .await?;

        tracing::debug!(endpoint = %self.info.name, count = sent.len(), "sent packet batch");
        Ok(sent)
    }

    /// Send `data` to `dst`.
    pub async fn send(&self, dst: EndpointName, label: Label, data: impl Into<Bytes>) -> Result<()> {
        self.send_and_return(dst, label, data).await.map(|_| ())
    }

    /// Send `data` to `dst` and return what was stored.
    ///
    /// That is one packet, or the fragments when `data` exceeds the MTU and
    /// a large-packet sender split it.
    pub async fn send_and_return(
        &self,
        dst: EndpointName,
        label: Label,
        data: impl Into<Bytes>,
    ) -> Result<Vec<Packet>> {
        let data = data.into();
        let mtu = self.config.mtu;

        if data.len() <= mtu {
            let draft = PacketDraft::complete(dst, label, data);
            return self.send_batch(vec![draft], |_, d| d.clone()).await;
        }

        let Some(sender) = &self.large_sender else {
            return Err(EndpointError::PacketTooLarge {
                size: data.len(),
                mtu,
            });
        };
        let size = data.len();
        let drafts = sender.split(&self.info, &dst, label, data, mtu)?;
        tracing::debug!(
            endpoint = %self.info.name,
            dst = %dst,
            size,
            fragments = drafts.len(),
            "split large packet"
        );
        self.send_batch(drafts, |_, d| d.clone()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Receiving
    // ─────────────────────────────────────────────────────────────────────────

    /// Accept a packet from a peer.
    ///
    /// A packet at the reserved [`SeqNumber::MAX`] is refused with
    /// [`CoreError::ReservedSeqNumber`]. Replays below the lower bound are
    /// ignored. A packet addressed to this
    /// endpoint is handed to the handlers and then consumed by raising the
    /// channel's lower bound past it; it is never stored. Any other packet
    /// is stored for forwarding, unless an identical one already is. A
    /// different packet under the same key is a [`EndpointError::Conflict`]
    /// and leaves the store untouched.
    pub async fn put_packet(&self, packet: Packet) -> Result<PutOutcome> {
        if !packet.seq_number.is_assignable() {
            return Err(CoreError::ReservedSeqNumber(packet.seq_number).into());
        }
        let info = self.info.clone();
        let handlers = self.handlers.clone();
        let protected = self.protected_labels(&packet.dst);
        let (src, dst, seq) = (packet.src.clone(), packet.dst.clone(), packet.seq_number);

        let outcome = self
            .transact(move |tx| {
                let lower = tx.lower_bound(&packet.src, &packet.dst)?;
                if packet.seq_number < lower {
                    return Ok(PutOutcome::Obsolete);
                }

                if packet.dst == info.name {
                    for handler in &handlers {
                        handler.handle(&info, &packet)?;
                    }
                    tx.update_lower_bound(
                        &packet.src,
                        &packet.dst,
                        Some(packet.seq_number.increment()),
                        protected,
                    )?;
                    return Ok(PutOutcome::Delivered);
                }

                match tx.get(&packet.src, &packet.dst, packet.seq_number)? {
                    None => {
                        tx.insert(&packet)?;
                        Ok(PutOutcome::Stored)
                    }
                    Some(existing) if existing == packet => Ok(PutOutcome::Duplicate),
                    Some(_) => Err(EndpointError::Conflict {
                        src: packet.src.clone(),
                        dst: packet.dst.clone(),
                        seq: packet.seq_number,
                    }),
                }
            })
            .await;

        match &outcome {
            Ok(result) => tracing::debug!(
                endpoint = %self.info.name,
                src = %src,
                dst = %dst,
                seq = %seq,
                outcome = ?result,
                "put packet"
            ),
            Err(EndpointError::Conflict { .. }) => tracing::warn!(
                endpoint = %self.info.name,
                src = %src,
                dst = %dst,
                seq = %seq,
                "rejected conflicting packet"
            ),
            Err(_) => {}
        }
        outcome
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bounds
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn lower_bound(&self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.lower_bound(&src, &dst)?))
            .await
    }

    pub async fn upper_bound(&self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.upper_bound(&src, &dst)?))
            .await
    }

    pub async fn next_seq_number(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<SeqNumber> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.next_seq_number(&src, &dst)?))
            .await
    }

    /// First stored sequence number and upper bound, or `None` when the
    /// channel holds no packets.
    pub async fn packet_bounds(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<PacketBounds>> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.packet_bounds(&src, &dst)?))
            .await
    }

    /// Check whether a packet at `seq` would be accepted on this channel.
    pub async fn is_admissible(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<bool> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.is_admissible(&src, &dst, seq)?))
            .await
    }

    /// Lower bounds of several channels, read in one transaction.
    pub async fn lower_bounds(&self, channels: Vec<Channel>) -> Result<Vec<(Channel, SeqNumber)>> {
        self.transact(move |tx| {
            let mut bounds = Vec::with_capacity(channels.len());
            for channel in channels {
                let lb = tx.lower_bound(&channel.src, &channel.dst)?;
                bounds.push((channel, lb));
            }
            Ok(bounds)
        })
        .await
    }

    /// Upper bounds of several channels, read in one transaction.
    pub async fn upper_bounds(&self, channels: Vec<Channel>) -> Result<Vec<(Channel, SeqNumber)>> {
        self.transact(move |tx| {
            let mut bounds = Vec::with_capacity(channels.len());
            for channel in channels {
                let ub = tx.upper_bound(&channel.src, &channel.dst)?;
                bounds.push((channel, ub));
            }
            Ok(bounds)
        })
        .await
    }

    /// Raise a channel's lower bound, evicting what falls below it.
    ///
    /// Returns the bound in effect afterwards.
    pub async fn update_lower_bound(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        proposed: Option<SeqNumber>,
    ) -> Result<SeqNumber> {
        let protected = self.protected_labels(dst);
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.update_lower_bound(&src, &dst, proposed, protected)?))
            .await
    }

    /// [`update_lower_bound`](Self::update_lower_bound) for several channels
    /// in one transaction.
    pub async fn update_lower_bounds(
        &self,
        proposals: Vec<(Channel, SeqNumber)>,
    ) -> Result<Vec<(Channel, SeqNumber)>> {
        let proposals: Vec<_> = proposals
            .into_iter()
            .map(|(channel, lb)| {
                let protected = self.protected_labels(&channel.dst);
                (channel, lb, protected)
            })
            .collect();

        self.transact(move |tx| {
            let mut bounds = Vec::with_capacity(proposals.len());
            for (channel, proposed, protected) in proposals {
                let lb =
                    tx.update_lower_bound(&channel.src, &channel.dst, Some(proposed), protected)?;
                bounds.push((channel, lb));
            }
            Ok(bounds)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Channels with at least one stored packet, sorted.
    pub async fn src_dst_pairs(&self) -> Result<Vec<Channel>> {
        self.transact(|tx| Ok(tx.unique_pairs()?)).await
    }

    /// Channels with stored packets or a recorded lower bound, sorted.
    pub async fn known_channels(&self) -> Result<Vec<Channel>> {
        self.transact(|tx| {
            let with_packets = tx.unique_pairs()?;
            let with_bounds = tx.lower_bound_pairs()?;
            Ok(channel_union(&with_packets, &with_bounds))
        })
        .await
    }

    pub async fn get_packet(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.get(&src, &dst, seq)?)).await
    }

    /// Like [`get_packet`](Self::get_packet), failing with
    /// [`EndpointError::NotFound`] when the packet is absent.
    pub async fn packet(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Packet> {
        self.get_packet(src, dst, seq)
            .await?
            .ok_or_else(|| EndpointError::NotFound(format!("{src}->{dst} seq {seq}")))
    }

    pub async fn first_packet_at_or_after(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<Packet>> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.first_at_or_after(&src, &dst, cursor)?))
            .await
    }

    pub async fn first_header_at_or_after(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.first_header_at_or_after(&src, &dst, cursor)?))
            .await
    }

    pub async fn total_packet_count(&self) -> Result<u64> {
        self.transact(|tx| Ok(tx.count_all()?)).await
    }

    /// Total payload size of `lower <= seq < upper` on a channel.
    pub async fn size_of_range(
        &self,
        src: &EndpointName,
        dst: &EndpointName,
        lower: SeqNumber,
        upper: SeqNumber,
    ) -> Result<u64> {
        let (src, dst) = (src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.size_of_range(&src, &dst, lower, upper)?))
            .await
    }

    /// [`size_of_range`](Self::size_of_range) for several ranges in one
    /// transaction.
    pub async fn range_sizes(&self, ranges: Vec<RangeSpec>) -> Result<Vec<u64>> {
        self.transact(move |tx| {
            let mut sizes = Vec::with_capacity(ranges.len());
            for r in &ranges {
                sizes.push(tx.size_of_range(&r.channel.src, &r.channel.dst, r.lower, r.upper)?);
            }
            Ok(sizes)
        })
        .await
    }

    /// Dump every packet and lower bound.
    pub async fn snapshot(&self) -> Result<EndpointSnapshot> {
        let name = self.info.name.clone();
        self.transact(move |tx| {
            Ok(EndpointSnapshot {
                name,
                packets: tx.all_packets()?,
                lower_bounds: tx.all_lower_bounds()?,
            })
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Cursors
    // ─────────────────────────────────────────────────────────────────────────

    /// How far `src->dst` has been read from `peer`.
    pub async fn foreign_cursor(
        &self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>> {
        let (peer, src, dst) = (peer.clone(), src.clone(), dst.clone());
        self.transact(move |tx| Ok(tx.cursor(&peer, &src, &dst)?))
            .await
    }

    /// Advance the cursor for `src->dst` read from `peer`.
    ///
    /// Never moves a cursor backwards. Returns the cursor in effect.
    pub async fn set_foreign_cursor(
        &self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<SeqNumber> {
        let (peer, src, dst) = (peer.clone(), src.clone(), dst.clone());
        self.transact(move |tx| {
            match tx.cursor(&peer, &src, &dst)? {
                Some(current) if current >= cursor => Ok(current),
                _ => {
                    tx.set_cursor(&peer, &src, &dst, cursor)?;
                    Ok(cursor)
                }
            }
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete every packet, lower bound and cursor of this endpoint's box.
    pub async fn reset(&self) -> Result<()> {
        self.transact(|tx| Ok(tx.clear()?)).await?;
        tracing::info!(endpoint = %self.info.name, "reset endpoint");
        Ok(())
    }

    /// Release the store. Later operations fail with
    /// [`EndpointError::Closed`]. Closing twice is harmless.
    pub fn close(&self) -> Result<()> {
        let mut guard = self
            .store
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        if guard.take().is_some() {
            tracing::debug!(endpoint = %self.info.name, "closed endpoint");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.store.read().map(|g| g.is_none()).unwrap_or(true)
    }
}

impl Endpoint<SqliteStore> {
    /// Open an endpoint backed by the SQLite file at `path`.
    ///
    /// The endpoint is named after the file (up to its first `.`) and uses
    /// that name as its box id.
    pub fn open_from_path(path: impl AsRef<Path>, config: EndpointConfig) -> Result<Self> {
        let path = path.as_ref();
        let name = endpoint_name_from_path(path)
            .ok_or_else(|| EndpointError::Naming(path.to_path_buf()))?;
        let store = SqliteStore::open(path, name.as_str())?;
        tracing::debug!(endpoint = %name, path = %path.display(), "opened endpoint");
        Ok(Self::new(name, store, config))
    }

    /// [`open_from_path`](Self::open_from_path), then wipe the box.
    pub async fn open_and_reset(path: impl AsRef<Path>, config: EndpointConfig) -> Result<Self> {
        let endpoint = Self::open_from_path(path, config)?;
        endpoint.reset().await?;
        Ok(endpoint)
    }
}

/// Run `op` on an endpoint, then close it.
///
/// Returns the first error: from `op` if it failed, otherwise from closing.
pub async fn with_endpoint<S, T, F, Fut>(endpoint: Endpoint<S>, op: F) -> Result<T>
where
    S: Store,
    F: FnOnce(Arc<Endpoint<S>>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let endpoint = Arc::new(endpoint);
    let result = op(Arc::clone(&endpoint)).await;
    let closed = endpoint.close();
    let value = result?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FragmentProtection;
    use crate::handler::HandlerError;
    use mailsync_store::MemoryStore;
    use std::sync::Mutex;

    fn name(s: &str) -> EndpointName {
        EndpointName::new(s).unwrap()
    }

    fn memory_endpoint(n: &str) -> Endpoint<MemoryStore> {
        Endpoint::new(name(n), MemoryStore::new(n), EndpointConfig::default())
    }

    fn sqlite_endpoint(n: &str) -> Endpoint<SqliteStore> {
        Endpoint::new(
            name(n),
            SqliteStore::open_memory(n).unwrap(),
            EndpointConfig::default(),
        )
    }

    struct HalvingSender;

    impl LargePacketSender for HalvingSender {
        fn split(
            &self,
            _from: &EndpointInfo,
            dst: &EndpointName,
            _label: Label,
            data: Bytes,
            mtu: usize,
        ) -> std::result::Result<Vec<PacketDraft>, HandlerError> {
            Ok(data
                .chunks(mtu)
                .enumerate()
                .map(|(i, chunk)| {
                    let label = if i == 0 {
                        Label::FIRST_FRAGMENT
                    } else {
                        Label::REMAINING_FRAGMENT
                    };
                    PacketDraft::complete(dst.clone(), label, Bytes::copy_from_slice(chunk))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_batch_numbers_contiguously() {
        let a = memory_endpoint("a");
        let sent = a
            .send_batch((0..5u8).collect(), |_, i| {
                PacketDraft::complete(name("b"), Label(1), vec![*i])
            })
            .await
            .unwrap();

        assert_eq!(sent.len(), 5);
        for pair in sent.windows(2) {
            assert_eq!(pair[1].seq_number, pair[0].seq_number.increment());
        }
        assert!(!sent[0].seq_number.is_zero());
        assert_eq!(
            a.upper_bound(&name("a"), &name("b")).await.unwrap(),
            sent[4].seq_number.increment()
        );
    }

    #[tokio::test]
    async fn test_generator_sees_sent_packets() {
        let a = memory_endpoint("a");
        let sent = a
            .send_batch(vec![(); 3], |sent, _| {
                PacketDraft::complete(name("b"), Label(1), vec![sent.len() as u8])
            })
            .await
            .unwrap();
        let payloads: Vec<u8> = sent.iter().map(|p| p.data[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_incomplete_draft_rolls_back_batch() {
        let a = memory_endpoint("a");
        let err = a
            .send_batch(vec![true, false], |_, complete| {
                if *complete {
                    PacketDraft::complete(name("b"), Label(1), vec![1u8])
                } else {
                    PacketDraft::new().dst(name("b"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EndpointError::Core(_)));
        assert_eq!(a.total_packet_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversize_without_sender() {
        let a = Endpoint::new(
            name("a"),
            MemoryStore::new("a"),
            EndpointConfig {
                mtu: 4,
                ..EndpointConfig::default()
            },
        );
        let err = a.send(name("b"), Label(1), vec![0u8; 5]).await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::PacketTooLarge { size: 5, mtu: 4 }
        ));
    }

    #[tokio::test]
    async fn test_oversize_goes_through_large_sender() {
        let mut a = Endpoint::new(
            name("a"),
            MemoryStore::new("a"),
            EndpointConfig {
                mtu: 4,
                ..EndpointConfig::default()
            },
        );
        a.set_large_packet_sender(HalvingSender);

        let sent = a
            .send_and_return(name("b"), Label(1), vec![7u8; 10])
            .await
            .unwrap();
        let labels: Vec<Label> = sent.iter().map(|p| p.label).collect();
        assert_eq!(
            labels,
            vec![
                Label::FIRST_FRAGMENT,
                Label::REMAINING_FRAGMENT,
                Label::REMAINING_FRAGMENT
            ]
        );
        assert_eq!(sent[2].seq_number, sent[0].seq_number.increment().increment());
    }

    #[tokio::test]
    async fn test_relay_stores_and_dedups() {
        let a = memory_endpoint("a");
        let relay = sqlite_endpoint("relay");

        let sent = a.send_and_return(name("c"), Label(1), b"hi".to_vec()).await.unwrap();
        let p = sent[0].clone();

        assert_eq!(relay.put_packet(p.clone()).await.unwrap(), PutOutcome::Stored);
        assert_eq!(relay.put_packet(p.clone()).await.unwrap(), PutOutcome::Duplicate);
        assert_eq!(relay.total_packet_count().await.unwrap(), 1);

        let forged = Packet {
            data: Bytes::from_static(b"evil"),
            ..p.clone()
        };
        let err = relay.put_packet(forged).await.unwrap_err();
        assert!(matches!(err, EndpointError::Conflict { .. }));
        assert_eq!(
            relay.packet(&p.src, &p.dst, p.seq_number).await.unwrap(),
            p
        );
    }

    #[tokio::test]
    async fn test_reserved_seq_number_is_refused() {
        let mut c = memory_endpoint("c");
        let seen = Arc::new(Mutex::new(0usize));
        {
            let seen = Arc::clone(&seen);
            c.add_packet_handler(
                move |_: &EndpointInfo, _: &Packet| -> std::result::Result<(), HandlerError> {
                    *seen.lock().unwrap() += 1;
                    Ok(())
                },
            );
        }
        let relay = sqlite_endpoint("relay");
        let top = Packet::new(name("a"), name("c"), SeqNumber::MAX, Label(1), b"top".to_vec());

        for result in [
            c.put_packet(top.clone()).await,
            c.put_packet(top.clone()).await,
            relay.put_packet(top.clone()).await,
        ] {
            assert!(matches!(
                result,
                Err(EndpointError::Core(CoreError::ReservedSeqNumber(SeqNumber::MAX)))
            ));
        }
        assert_eq!(*seen.lock().unwrap(), 0);
        assert_eq!(relay.total_packet_count().await.unwrap(), 0);
        assert_eq!(c.lower_bound(&name("a"), &name("c")).await.unwrap(), SeqNumber::ZERO);

        // The last assignable number is delivered once, then obsolete.
        let below = Packet {
            seq_number: SeqNumber::new(u64::MAX - 1),
            ..top
        };
        assert_eq!(c.put_packet(below.clone()).await.unwrap(), PutOutcome::Delivered);
        assert_eq!(c.put_packet(below).await.unwrap(), PutOutcome::Obsolete);
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(c.lower_bound(&name("a"), &name("c")).await.unwrap(), SeqNumber::MAX);
    }

    #[tokio::test]
    async fn test_send_stops_below_reserved_seq_number() {
        let a = memory_endpoint("a");
        let last = Packet::new(
            name("a"),
            name("c"),
            SeqNumber::new(u64::MAX - 1),
            Label(1),
            b"last".to_vec(),
        );
        assert_eq!(a.put_packet(last).await.unwrap(), PutOutcome::Stored);

        let err = a.send(name("c"), Label(1), b"one more".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            EndpointError::Core(CoreError::ReservedSeqNumber(SeqNumber::MAX))
        ));
        assert_eq!(a.total_packet_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_destination_consumes() {
        let mut c = memory_endpoint("c");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        c.add_packet_handler(move |ep: &EndpointInfo, p: &Packet| -> std::result::Result<(), HandlerError> {
            assert_eq!(ep.name, "c");
            sink.lock().unwrap().push(p.seq_number);
            Ok(())
        });

        let p = Packet::new(name("a"), name("c"), SeqNumber::new(40), Label(1), vec![1u8]);
        assert_eq!(c.put_packet(p.clone()).await.unwrap(), PutOutcome::Delivered);
        assert_eq!(c.put_packet(p.clone()).await.unwrap(), PutOutcome::Obsolete);

        let earlier = Packet {
            seq_number: SeqNumber::new(12),
            ..p.clone()
        };
        assert_eq!(c.put_packet(earlier).await.unwrap(), PutOutcome::Obsolete);

        assert_eq!(*seen.lock().unwrap(), vec![SeqNumber::new(40)]);
        assert_eq!(c.total_packet_count().await.unwrap(), 0);
        assert_eq!(
            c.lower_bound(&name("a"), &name("c")).await.unwrap(),
            SeqNumber::new(41)
        );
    }

    #[tokio::test]
    async fn test_handler_error_aborts_delivery() {
        let mut c = memory_endpoint("c");
        c.add_packet_handler(|_: &EndpointInfo, _: &Packet| -> std::result::Result<(), HandlerError> { Ok(()) });
        c.add_packet_handler(|_: &EndpointInfo, _: &Packet| -> std::result::Result<(), HandlerError> {
            Err(HandlerError::new("refused"))
        });

        let p = Packet::new(name("a"), name("c"), SeqNumber::new(5), Label(1), vec![1u8]);
        let err = c.put_packet(p).await.unwrap_err();
        assert!(matches!(err, EndpointError::Handler(ref e) if e.message() == "refused"));

        // Still admissible: the floor did not move.
        assert!(c
            .is_admissible(&name("a"), &name("c"), SeqNumber::new(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_lower_bound_eviction() {
        let relay = memory_endpoint("relay");
        let (a, c) = (name("a"), name("c"));
        for seq in 1..=5 {
            relay
                .put_packet(Packet::new(a.clone(), c.clone(), SeqNumber::new(seq), Label(1), vec![0u8]))
                .await
                .unwrap();
        }

        let lb = relay
            .update_lower_bound(&a, &c, Some(SeqNumber::new(4)))
            .await
            .unwrap();
        assert_eq!(lb, SeqNumber::new(4));
        assert_eq!(relay.total_packet_count().await.unwrap(), 2);
        assert_eq!(
            relay.packet_bounds(&a, &c).await.unwrap(),
            Some(PacketBounds {
                lower: SeqNumber::new(4),
                upper: SeqNumber::new(6)
            })
        );

        let replay = Packet::new(a.clone(), c.clone(), SeqNumber::new(2), Label(1), vec![0u8]);
        assert_eq!(relay.put_packet(replay).await.unwrap(), PutOutcome::Obsolete);
    }

    #[tokio::test]
    async fn test_fragment_protection_always() {
        let relay = Endpoint::new(
            name("relay"),
            MemoryStore::new("relay"),
            EndpointConfig {
                fragment_protection: FragmentProtection::Always,
                ..EndpointConfig::default()
            },
        );
        let (a, c) = (name("a"), name("c"));
        relay
            .put_packet(Packet::new(a.clone(), c.clone(), SeqNumber::new(1), Label::FIRST_FRAGMENT, vec![0u8]))
            .await
            .unwrap();
        relay
            .put_packet(Packet::new(a.clone(), c.clone(), SeqNumber::new(2), Label(1), vec![0u8]))
            .await
            .unwrap();

        relay
            .update_lower_bounds(vec![(Channel::new(a.clone(), c.clone()), SeqNumber::new(3))])
            .await
            .unwrap();
        let left = relay.snapshot().await.unwrap().packets;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].label, Label::FIRST_FRAGMENT);
    }

    #[tokio::test]
    async fn test_batched_bounds_and_channels() {
        let a = memory_endpoint("a");
        a.send(name("b"), Label(1), vec![1u8]).await.unwrap();
        a.send(name("c"), Label(1), vec![1u8]).await.unwrap();
        a.update_lower_bound(&name("x"), &name("y"), Some(SeqNumber::new(9)))
            .await
            .unwrap();

        let pairs = a.src_dst_pairs().await.unwrap();
        assert_eq!(
            pairs,
            vec![
                Channel::new(name("a"), name("b")),
                Channel::new(name("a"), name("c"))
            ]
        );
        let known = a.known_channels().await.unwrap();
        assert_eq!(known.len(), 3);
        assert_eq!(known[2], Channel::new(name("x"), name("y")));

        let lowers = a.lower_bounds(known.clone()).await.unwrap();
        let uppers = a.upper_bounds(known).await.unwrap();
        assert_eq!(lowers[2].1, SeqNumber::new(9));
        assert_eq!(uppers[2].1, SeqNumber::new(9));
        assert_eq!(uppers[0].1, lowers[0].1.increment());
    }

    #[tokio::test]
    async fn test_range_sizes() {
        let a = memory_endpoint("a");
        let sent = a
            .send_batch(vec![3usize, 4, 5], |_, n| {
                PacketDraft::complete(name("b"), Label(1), vec![0u8; *n])
            })
            .await
            .unwrap();
        let channel = Channel::new(name("a"), name("b"));
        let first = sent[0].seq_number;

        let sizes = a
            .range_sizes(vec![
                RangeSpec {
                    channel: channel.clone(),
                    lower: first,
                    upper: first.increment().increment(),
                },
                RangeSpec {
                    channel,
                    lower: first,
                    upper: SeqNumber::MAX,
                },
            ])
            .await
            .unwrap();
        assert_eq!(sizes, vec![7, 12]);
    }

    #[tokio::test]
    async fn test_foreign_cursor_is_monotonic() {
        let a = memory_endpoint("a");
        let (peer, src, dst) = (name("p"), name("x"), name("y"));
        assert_eq!(a.foreign_cursor(&peer, &src, &dst).await.unwrap(), None);

        a.set_foreign_cursor(&peer, &src, &dst, SeqNumber::new(10)).await.unwrap();
        let kept = a
            .set_foreign_cursor(&peer, &src, &dst, SeqNumber::new(3))
            .await
            .unwrap();
        assert_eq!(kept, SeqNumber::new(10));
        assert_eq!(
            a.foreign_cursor(&peer, &src, &dst).await.unwrap(),
            Some(SeqNumber::new(10))
        );
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let a = memory_endpoint("a");
        a.send(name("b"), Label(2), b"payload".to_vec()).await.unwrap();
        let snapshot = a.snapshot().await.unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: EndpointSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[tokio::test]
    async fn test_reset_and_close() {
        let a = sqlite_endpoint("a");
        a.send(name("b"), Label(1), vec![1u8]).await.unwrap();
        a.reset().await.unwrap();
        assert_eq!(a.total_packet_count().await.unwrap(), 0);

        a.close().unwrap();
        a.close().unwrap();
        assert!(a.is_closed());
        let err = a.total_packet_count().await.unwrap_err();
        assert!(matches!(err, EndpointError::Closed(_)));
    }

    #[tokio::test]
    async fn test_open_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boat42.sqlite.db");

        {
            let ep = Endpoint::open_from_path(&path, EndpointConfig::default()).unwrap();
            assert_eq!(ep.name(), &name("boat42"));
            ep.send(name("shore"), Label(1), vec![1u8]).await.unwrap();
        }

        let ep = Endpoint::open_from_path(&path, EndpointConfig::default()).unwrap();
        assert_eq!(ep.total_packet_count().await.unwrap(), 1);

        let ep = Endpoint::open_and_reset(&path, EndpointConfig::default())
            .await
            .unwrap();
        assert_eq!(ep.total_packet_count().await.unwrap(), 0);

        let err = Endpoint::open_from_path(dir.path().join(".db"), EndpointConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, EndpointError::Naming(_)));
    }

    #[tokio::test]
    async fn test_with_endpoint_closes() {
        let count = with_endpoint(memory_endpoint("a"), |ep| async move {
            ep.send(name("b"), Label(1), vec![1u8]).await?;
            let count = ep.total_packet_count().await?;
            assert!(ep.close().is_ok());
            Ok::<_, EndpointError>(count)
        })
        .await
        .unwrap();
        assert_eq!(count, 1);

        let err = with_endpoint(memory_endpoint("a"), |ep| async move {
            ep.packet(&name("a"), &name("b"), SeqNumber::new(1)).await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, EndpointError::NotFound(_)));
    }
}
