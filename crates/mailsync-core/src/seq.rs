//! Sequence numbers: monotonically ordered, fixed-width encoded.
//!
//! A sequence number is a `u64` that is persisted and transmitted as exactly
//! 16 lowercase hex digits. Because the width is fixed and zero-padded,
//! comparing two encodings as strings gives the same answer as comparing the
//! numbers. Storage backends rely on this to do range queries on a TEXT
//! column.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CoreError, Result};

/// Number of hex digits in an encoded sequence number.
pub const SEQ_HEX_WIDTH: usize = 16;

/// Bits of random jitter below the millisecond timestamp in
/// [`SeqNumber::from_current_time`].
const TIME_JITTER_BITS: u32 = 16;

/// A sequence number within a channel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SeqNumber(pub u64);

impl SeqNumber {
    /// The smallest sequence number.
    pub const ZERO: Self = Self(0);

    /// The largest sequence number.
    ///
    /// Reserved: no packet carries it, so every packet sequence number has
    /// a strictly greater successor to serve as lower bound or cursor.
    pub const MAX: Self = Self(u64::MAX);

    /// The smallest sequence number.
    pub const fn zero() -> Self {
        Self::ZERO
    }

    /// Create from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw value.
    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The next sequence number.
    ///
    /// Saturates at [`SeqNumber::MAX`]. Use [`SeqNumber::checked_increment`]
    /// where the value may come from a peer.
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The next sequence number, or `None` at [`SeqNumber::MAX`].
    pub const fn checked_increment(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }

    /// Whether a packet may carry this sequence number.
    pub const fn is_assignable(self) -> bool {
        self.0 != u64::MAX
    }

    /// A sequence number derived from the wall clock.
    ///
    /// Used as the first sequence number of a channel that has never been
    /// written to, so that independently initialized senders start at
    /// roughly time-ordered, unlikely-to-collide positions.
    pub fn from_current_time() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::from_millis(millis, rand::random::<u16>())
    }

    /// Build a time-derived sequence number from parts.
    pub fn from_millis(millis: u64, jitter: u16) -> Self {
        let value = (millis << TIME_JITTER_BITS) | u64::from(jitter);
        // Zero is reserved for "never written".
        Self(value.max(1))
    }

    /// Encode as 16 lowercase hex digits.
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from exactly 16 hex digits.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != SEQ_HEX_WIDTH {
            return Err(CoreError::InvalidSeqNumber(s.to_string()));
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|_| CoreError::InvalidSeqNumber(s.to_string()))?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.to_hex())
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for SeqNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<u64> for SeqNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for SeqNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SeqNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
