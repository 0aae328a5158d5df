//! Store trait: the abstract interface for packet persistence.
//!
//! A [`Store`] hands out transactions; a [`PacketTx`] is what a transaction
//! body sees. Every read-check-write sequence of the endpoint runs inside a
//! single `transact` call, so backends only need to guarantee isolation per
//! transaction.

use mailsync_core::{Channel, EndpointName, Label, Packet, PacketHeader, SeqNumber};

use crate::error::{Result, StoreError};

/// The Store trait: transactional access to one box.
///
/// `transact` is blocking. Callers on an async runtime run it inside
/// `tokio::task::spawn_blocking`.
///
/// # Design Notes
///
/// - **Commit on Ok**: the body's `Ok` commits, its `Err` rolls back. A
///   failing commit or rollback is returned instead of the body's result.
/// - **Error type**: the body picks its own error type, which only needs to
///   absorb [`StoreError`]. The endpoint uses this to carry conflicts and
///   handler failures out of the transaction.
pub trait Store: Send + Sync + 'static {
    /// Run `f` inside a transaction.
    fn transact<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn PacketTx) -> std::result::Result<T, E>,
        E: From<StoreError>;

    /// Identifier of the box this store reads and writes.
    fn box_id(&self) -> &str;
}

/// Operations available inside a transaction.
///
/// Channel listings are sorted by `(src, dst)`. Sequence number ranges are
/// half-open: `lower` inclusive, `upper` exclusive.
pub trait PacketTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Packets
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a packet. Fails with [`StoreError::DuplicateKey`] if the key
    /// is taken.
    fn insert(&mut self, packet: &Packet) -> Result<()>;

    /// Get a packet by key.
    fn get(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<Option<Packet>>;

    /// Smallest stored sequence number on a channel.
    fn first_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>>;

    /// Largest stored sequence number on a channel.
    fn last_seq(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<Option<SeqNumber>>;

    /// First packet on a channel with `seq >= cursor`.
    fn first_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<Packet>>;

    /// Like [`first_at_or_after`](Self::first_at_or_after), without the
    /// payload.
    fn first_header_at_or_after(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<Option<PacketHeader>>;

    /// Delete packets on a channel with `seq < floor`, except those whose
    /// label is in `protected`. Returns the number deleted.
    fn delete_below(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        floor: SeqNumber,
        protected: &[Label],
    ) -> Result<usize>;

    /// Total number of stored packets.
    fn count_all(&mut self) -> Result<u64>;

    /// Channels with at least one stored packet.
    fn unique_pairs(&mut self) -> Result<Vec<Channel>>;

    /// Sum of payload sizes on a channel for `lower <= seq < upper`.
    fn size_of_range(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower: SeqNumber,
        upper: SeqNumber,
    ) -> Result<u64>;

    /// Every stored packet, ordered by `(src, dst, seq)`.
    fn all_packets(&mut self) -> Result<Vec<Packet>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lower Bounds
    // ─────────────────────────────────────────────────────────────────────────

    /// The persisted lower bound of a channel, if one was ever written.
    fn stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>>;

    /// Insert or overwrite the persisted lower bound of a channel.
    fn set_stored_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        lower_bound: SeqNumber,
    ) -> Result<()>;

    /// Channels with a persisted lower bound.
    fn lower_bound_pairs(&mut self) -> Result<Vec<Channel>>;

    /// Every persisted lower bound, ordered by channel.
    fn all_lower_bounds(&mut self) -> Result<Vec<(Channel, SeqNumber)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Cursors
    // ─────────────────────────────────────────────────────────────────────────

    /// How far this box has read `src->dst` from `peer`.
    fn cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<SeqNumber>>;

    /// Insert or overwrite a sync cursor.
    fn set_cursor(
        &mut self,
        peer: &EndpointName,
        src: &EndpointName,
        dst: &EndpointName,
        cursor: SeqNumber,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete everything this box owns: packets, lower bounds and cursors.
    fn clear(&mut self) -> Result<()>;
}
