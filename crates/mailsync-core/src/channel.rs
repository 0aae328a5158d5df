//! Channels: the ordered stream of packets for one `(src, dst)` pair.
//!
//! Channel lists returned by stores are sorted by `(src, dst)`. The set
//! operations below merge two sorted lists in a single pass and keep the
//! output sorted and free of duplicates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::EndpointName;

/// A `(src, dst)` pair. Orders by `src`, then `dst`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub src: EndpointName,
    pub dst: EndpointName,
}

impl Channel {
    pub fn new(src: EndpointName, dst: EndpointName) -> Self {
        Self { src, dst }
    }

    /// Check if `name` is either end of the channel.
    pub fn involves(&self, name: &EndpointName) -> bool {
        &self.src == name || &self.dst == name
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// Sorted union of two sorted channel lists.
pub fn channel_union(a: &[Channel], b: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Sorted intersection of two sorted channel lists.
pub fn channel_intersection(a: &[Channel], b: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    out
}

/// Channels of `a` that are not in `b`. Both inputs sorted.
pub fn channel_difference(a: &[Channel], b: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => j += 1,
        }
    }
    out.extend_from_slice(&a[i..]);
    out
}

/// Channels where `name` is the source or the destination.
pub fn filter_by_name(channels: &[Channel], name: &EndpointName) -> Vec<Channel> {
    channels.iter().filter(|c| c.involves(name)).cloned().collect()
}
