//! Bounds algebra over a transaction.
//!
//! For a channel `(src, dst)`:
//!
//! - the **lower bound** is the larger of the persisted floor and the first
//!   stored sequence number. Anything below it is obsolete.
//! - the **upper bound** is one past the last stored sequence number, or the
//!   lower bound when nothing is stored.
//!
//! Every retained packet satisfies `lower <= seq < upper`, except packets
//! with protected labels that survived an eviction.

use serde::{Deserialize, Serialize};

use mailsync_core::{EndpointName, Label, SeqNumber};

use crate::error::Result;
use crate::traits::PacketTx;

/// First stored sequence number and upper bound of a non-empty channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketBounds {
    pub lower: SeqNumber,
    pub upper: SeqNumber,
}

/// Extension trait implementing the bounds algebra for every [`PacketTx`].
pub trait BoundsExt: PacketTx {
    /// Lower bound of a channel. Zero if nothing was ever stored or floored.
    fn lower_bound(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        let stored = self.stored_lower_bound(src, dst)?.unwrap_or_default();
        let first = self.first_seq(src, dst)?.unwrap_or_default();
        Ok(stored.max(first))
    }

    /// Upper bound of a channel.
    fn upper_bound(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        match self.last_seq(src, dst)? {
            Some(last) => Ok(last.increment()),
            None => self.lower_bound(src, dst),
        }
    }

    /// The sequence number the next packet sent on this channel gets.
    ///
    /// A channel that has never been used starts from the wall clock.
    fn next_seq_number(&mut self, src: &EndpointName, dst: &EndpointName) -> Result<SeqNumber> {
        let upper = self.upper_bound(src, dst)?;
        if upper.is_zero() {
            Ok(SeqNumber::from_current_time())
        } else {
            Ok(upper)
        }
    }

    /// Raise the lower bound of a channel and evict what falls below it.
    ///
    /// Proposals that are absent or do not raise the current bound leave
    /// the store untouched. Packets labelled with one of `protected` are
    /// kept. Returns the lower bound in effect afterwards.
    fn update_lower_bound(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        proposed: Option<SeqNumber>,
        protected: &[Label],
    ) -> Result<SeqNumber> {
        let current = self.lower_bound(src, dst)?;
        let proposed = match proposed {
            Some(p) if p > current => p,
            _ => return Ok(current),
        };

        self.set_stored_lower_bound(src, dst, proposed)?;
        let evicted = self.delete_below(src, dst, proposed, protected)?;
        tracing::debug!(
            src = %src,
            dst = %dst,
            lower_bound = %proposed,
            evicted,
            "raised lower bound"
        );
        Ok(proposed)
    }

    /// Bounds of the stored packets, or `None` for an empty channel.
    fn packet_bounds(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
    ) -> Result<Option<PacketBounds>> {
        let Some(lower) = self.first_seq(src, dst)? else {
            return Ok(None);
        };
        let upper = self.upper_bound(src, dst)?;
        Ok(Some(PacketBounds { lower, upper }))
    }

    /// Check whether a packet at `seq` is still wanted on this channel.
    ///
    /// The reserved [`SeqNumber::MAX`] never is.
    fn is_admissible(
        &mut self,
        src: &EndpointName,
        dst: &EndpointName,
        seq: SeqNumber,
    ) -> Result<bool> {
        Ok(seq.is_assignable() && seq >= self.lower_bound(src, dst)?)
    }
}

impl<T: PacketTx + ?Sized> BoundsExt for T {}
