//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use mailsync_core::{Channel, EndpointName, Label, Packet, PacketHeader, SeqNumber};

use crate::error::{Result, StoreError};
use crate::traits::{PacketTx, Store};

type PacketKey = (EndpointName, EndpointName, SeqNumber);
type CursorKey = (EndpointName, EndpointName, EndpointName);

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Transactions are serialized
/// by a lock. The first write of a transaction copies the state and the copy
/// is swapped in on commit, so an `Err` leaves nothing behind. Read-only
/// transactions never copy. Payloads are `Bytes`, which keeps the copy
/// shallow, but the maps themselves are cloned in full: a write costs
/// O(stored packets).
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
    box_id: String,
}

#[derive(Clone, Default)]
struct MemoryState {
    packets: BTreeMap<PacketKey, Packet>,
    lower_bounds: BTreeMap<Channel, SeqNumber>,
    /// (peer, src, dst) -> cursor
    cursors: BTreeMap<CursorKey, SeqNumber>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new(box_id: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(MemoryState::default()),
            box_id: box_id.into(),
        }
    }
}

impl Store for MemoryStore {
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn PacketTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        let (value, working) = {
            let mut tx = MemoryTx {
                base: &*state,
                working: None,
            };
            let value = f(&mut tx)?;
            (value, tx.working)
        };
        if let Some(working) = working {
            *state = working;
        }
        Ok(value)
    }

    fn box_id(&self) -> &str {
        &self.box_id
    }
}

/// A transaction over a [`MemoryState`], copied on first write.
struct MemoryTx<'a> {
    base: &'a MemoryState,
    working: Option<MemoryState>,
}

impl MemoryTx<'_> {
    fn state(&self) -> &MemoryState {
        self.working.as_ref().unwrap_or(self.base)
    }

    fn state_mut(&mut self) -> &mut MemoryState {
        let base = self.base;
        self.working.get_or_insert_with(|| base.clone())
    }
}

fn channel_range(
    src: &EndpointName,
    dst: &EndpointName,
    lower: Bound<SeqNumber>,
    upper: Bound<SeqNumber>,
) -> (Bound<PacketKey>, Bound<PacketKey>) {
    let key = |bound: Bound<SeqNumber>| match bound {
        Bound::Included(seq) => Bound::Included((src.clone(), dst.clone(), seq)),
        Bound::Excluded(seq) => Bound::Excluded((src.clone(), dst.clone(), seq)),
        Bound::Unbounded => Bound::Unbounded,
    };
    (key(lower), key(upper))
}

impl MemoryState {
    fn channel_packets<'a>(
        &'a self,
        src: &EndpointName,
        dst: &EndpointName,
        lower: Bound<SeqNumber>,
        upper: Bound<SeqNumber>,
    ) -> impl DoubleEndedIterator<Item = &'a Packet> + 'a {
        self.packets
            .range(channel_range(src, dst, lower, upper))
            .map(|(_, p)| p)
    }

    fn whole_channel<'a>(
        &'a self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> impl DoubleEndedIterator<Item = &'a Packet> + 'a {
        self.channel_packets(
            src,
            dst,
            Bound::Included(SeqNumber::ZERO),
            Bound::Included(SeqNumber::MAX),
        )
    }
}

impl PacketTx for MemoryTx<'_> {
    fn insert(&mut self, packet: &Packet) -> Result<()> {
        let key = (packet.src.clone(), packet.dst.clone(), packet.seq_number);
        if self.state().packets.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                src: packet.src.clone(),
                dst: packet.dst.clone(),
                seq: packet.seq_number,
            });
        }
        self.state_mut().packets.insert(key, packet.clone());
        Ok(())
    }

    fn get(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>> {
        Ok(self
            .state()
            .packets
            .get(&(src.clone(), dst.clone(), seq))
            .cloned())
    }

    fn first_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>> {
        Ok(self.state().whole_channel(src, dst).next().map(|p| p.seq_number))
    }

    fn last_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>> {
        Ok(self
            .state()
            .whole_channel(src, dst)
            .next_back()
            .map(|p| p.seq_number))
    }

    fn first_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<Packet>> {
        Ok(self
            .state()
            .channel_packets(
                src,
                dst,
                Bound::Included(cursor),
                Bound::Included(SeqNumber::MAX),
            )
            .next()
            .cloned())
    }

    fn first_header_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>> {
        Ok(self
            .state()
            .channel_packets(
                src,
                dst,
                Bound::Included(cursor),
                Bound::Included(SeqNumber::MAX),
            )
            .next()
            .map(Packet::header))
    }

    fn delete_below(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        floor: SeqNumber,
        protected: &[Label],
    ) -> Result<usize> {
        let doomed: Vec<PacketKey> = self
            .state()
            .channel_packets(
                src,
                dst,
                Bound::Included(SeqNumber::ZERO),
                Bound::Excluded(floor),
            )
            .filter(|p| !protected.contains(&p.label))
            .map(|p| (p.src.clone(), p.dst.clone(), p.seq_number))
            .collect();

        if !doomed.is_empty() {
            let state = self.state_mut();
            for key in &doomed {
                state.packets.remove(key);
            }
        }
        Ok(doomed.len())
    }

    fn count_all(&mut self) -> Result<u64> {
        Ok(self.state().packets.len() as u64)
    }

    fn unique_pairs(&mut self) -> Result<Vec<Channel>> {
        let mut pairs: Vec<Channel> = Vec::new();
        for (src, dst, _) in self.state().packets.keys() {
            if pairs.last().map_or(true, |c| &c.src != src || &c.dst != dst) {
                pairs.push(Channel::new(src.clone(), dst.clone()));
            }
        }
        Ok(pairs)
    }

    fn size_of_range(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower: SeqNumber,
        upper: SeqNumber,
    ) -> Result<u64> {
        if lower >= upper {
            return Ok(0);
        }
        Ok(self
            .state()
            .channel_packets(src, dst, Bound::Included(lower), Bound::Excluded(upper))
            .map(|p| p.data.len() as u64)
            .sum())
    }

    fn all_packets(&mut self) -> Result<Vec<Packet>> {
        Ok(self.state().packets.values().cloned().collect())
    }

    fn stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>> {
        Ok(self
            .state()
            .lower_bounds
            .get(&Channel::new(src.clone(), dst.clone()))
            .copied())
    }

    fn set_stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower_bound: SeqNumber,
    ) -> Result<()> {
        self.state_mut()
            .lower_bounds
            .insert(Channel::new(src.clone(), dst.clone()), lower_bound);
        Ok(())
    }

    fn lower_bound_pairs(&mut self) -> Result<Vec<Channel>> {
        Ok(self.state().lower_bounds.keys().cloned().collect())
    }

    fn all_lower_bounds(&mut self) -> Result<Vec<(Channel, SeqNumber)>> {
        Ok(self
            .state()
            .lower_bounds
            .iter()
            .map(|(c, lb)| (c.clone(), *lb))
            .collect())
    }

    fn cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>> {
        Ok(self
            .state()
            .cursors
            .get(&(peer.clone(), src.clone(), dst.clone()))
            .copied())
    }

    fn set_cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<()> {
        self.state_mut()
            .cursors
            .insert((peer.clone(), src.clone(), dst.clone()), cursor);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.working = Some(MemoryState::default());
        Ok(())
    }
}
