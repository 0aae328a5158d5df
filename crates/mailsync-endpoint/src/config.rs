//! Endpoint configuration.

use mailsync_core::Label;

/// Default maximum payload size of a single packet, in bytes.
pub const DEFAULT_MTU: usize = 100_000;

/// Which labels survive lower-bound eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FragmentProtection {
    /// Protect fragment labels only on channels addressed to this endpoint.
    #[default]
    DestinationOnly,
    /// Protect fragment labels on every channel.
    Always,
}

impl FragmentProtection {
    /// Labels to keep when evicting on a channel.
    pub fn protected_labels(self, is_destination: bool) -> &'static [Label] {
        match self {
            FragmentProtection::Always => &Label::FRAGMENTS,
            FragmentProtection::DestinationOnly if is_destination => &Label::FRAGMENTS,
            FragmentProtection::DestinationOnly => &[],
        }
    }
}

/// Configuration for an [`Endpoint`](crate::Endpoint).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Payloads larger than this go through the large-packet sender.
    pub mtu: usize,
    /// Whether this endpoint is a leaf of the relay topology.
    pub is_leaf: bool,
    /// Eviction policy for fragment labels.
    pub fragment_protection: FragmentProtection,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            is_leaf: true,
            fragment_protection: FragmentProtection::default(),
        }
    }
}
