//! The pull protocol and the synchronization schedules built on it.
//!
//! A pull walks every channel the remote knows about, in sequence order,
//! starting where the previous pull from the same peer stopped. Headers are
//! fetched first; the payload is only transferred when the local endpoint
//! would still admit the packet.

use mailsync_core::{Channel, SeqNumber};
use mailsync_endpoint::{Endpoint, PutOutcome};
use mailsync_store::Store;

use crate::error::{Result, SyncError};
use crate::remote::RemotePeer;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Adopt the remote's lower bound of each channel before walking it.
    ///
    /// This is how consumption at a destination propagates back along a
    /// relay chain and lets relays drop delivered packets.
    pub exchange_lower_bounds: bool,
    /// Stop walking a channel after this many remote headers. The cursor is
    /// saved, so the next pull resumes where this one stopped.
    pub max_steps_per_channel: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            exchange_lower_bounds: true,
            max_steps_per_channel: None,
        }
    }
}

/// Counters of one or more sync passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Channels walked.
    pub channels: usize,
    /// Remote headers fetched.
    pub headers_fetched: usize,
    /// Full packets fetched.
    pub packets_fetched: usize,
    /// Packets delivered to the local endpoint.
    pub delivered: usize,
    /// Packets stored for forwarding.
    pub stored: usize,
    /// Packets that were already stored, or became obsolete in flight.
    pub duplicates: usize,
    /// Headers skipped because the local endpoint no longer admits them.
    pub skipped: usize,
    /// Headers whose packet vanished from the remote before it was fetched.
    pub missing: usize,
}

impl SyncReport {
    /// Add another report's counters to this one.
    pub fn absorb(&mut self, other: SyncReport) {
        self.channels += other.channels;
        self.headers_fetched += other.headers_fetched;
        self.packets_fetched += other.packets_fetched;
        self.delivered += other.delivered;
        self.stored += other.stored;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.missing += other.missing;
    }

    fn record(&mut self, outcome: PutOutcome) {
        match outcome {
            PutOutcome::Delivered => self.delivered += 1,
            PutOutcome::Stored => self.stored += 1,
            PutOutcome::Duplicate | PutOutcome::Obsolete => self.duplicates += 1,
        }
    }
}

/// Fetch from `remote` every packet `local` is missing.
///
/// Channels are walked one after another. On error the pass stops, but the
/// cursor of the channel being walked is saved at the last packet that was
/// fully handled, so a later pull neither loses nor redelivers anything.
pub async fn pull<S, R>(local: &Endpoint<S>, remote: &R, config: &SyncConfig) -> Result<SyncReport>
where
    S: Store,
    R: RemotePeer + ?Sized,
{
    let mut report = SyncReport::default();
    let peer = remote.name().clone();

    for channel in remote.known_channels().await? {
        report.channels += 1;
        let (src, dst) = (&channel.src, &channel.dst);

        if config.exchange_lower_bounds {
            let remote_lb = remote.lower_bound(src, dst).await?;
            local.update_lower_bound(src, dst, Some(remote_lb)).await?;
        }

        let mut cursor = match local.foreign_cursor(&peer, src, dst).await? {
            Some(cursor) => cursor,
            None => local.lower_bound(src, dst).await?,
        };

        let walked = walk_channel(local, remote, &channel, &mut cursor, config, &mut report).await;
        local.set_foreign_cursor(&peer, src, dst, cursor).await?;
        walked?;

        tracing::debug!(
            endpoint = %local.name(),
            peer = %peer,
            src = %src,
            dst = %dst,
            cursor = %cursor,
            "walked channel"
        );
    }

    tracing::info!(
        endpoint = %local.name(),
        peer = %peer,
        channels = report.channels,
        delivered = report.delivered,
        stored = report.stored,
        skipped = report.skipped,
        "pull complete"
    );
    Ok(report)
}

/// Walk one channel from `cursor`, advancing it past every handled packet.
///
/// Whatever the remote answers must belong to the walked channel and lie at
/// or after the cursor; anything else is a [`SyncError::Transport`] and the
/// cursor stays where it was.
async fn walk_channel<S, R>(
    local: &Endpoint<S>,
    remote: &R,
    channel: &Channel,
    cursor: &mut SeqNumber,
    config: &SyncConfig,
    report: &mut SyncReport,
) -> Result<()>
where
    S: Store,
    R: RemotePeer + ?Sized,
{
    let (src, dst) = (&channel.src, &channel.dst);
    let mut steps = 0usize;

    loop {
        if config.max_steps_per_channel.is_some_and(|max| steps >= max) {
            return Ok(());
        }
        steps += 1;

        let Some(header) = remote.first_header_at_or_after(src, dst, *cursor).await? else {
            return Ok(());
        };
        report.headers_fetched += 1;
        if header.channel() != *channel || header.seq_number < *cursor {
            return Err(SyncError::Transport(format!(
                "{} answered header {}->{} seq {} for {}->{} at {}",
                remote.name(),
                header.src,
                header.dst,
                header.seq_number,
                src,
                dst,
                cursor
            )));
        }

        if !local.is_admissible(src, dst, header.seq_number).await? {
            report.skipped += 1;
            if !advance(cursor, header.seq_number) {
                return Ok(());
            }
            continue;
        }

        match remote.get_packet(src, dst, header.seq_number).await? {
            Some(packet) => {
                if packet.header() != header {
                    return Err(SyncError::Transport(format!(
                        "{} answered packet {}->{} seq {} for header {}->{} seq {}",
                        remote.name(),
                        packet.src,
                        packet.dst,
                        packet.seq_number,
                        src,
                        dst,
                        header.seq_number
                    )));
                }
                report.packets_fetched += 1;
                let outcome = local.put_packet(packet).await?;
                report.record(outcome);
            }
            None => {
                tracing::warn!(
                    endpoint = %local.name(),
                    peer = %remote.name(),
                    src = %src,
                    dst = %dst,
                    seq = %header.seq_number,
                    "packet vanished between header and full fetch"
                );
                report.missing += 1;
            }
        }
        if !advance(cursor, header.seq_number) {
            return Ok(());
        }
    }
}

/// Move `cursor` just past `seq`. Returns `false` when nothing can follow.
fn advance(cursor: &mut SeqNumber, seq: SeqNumber) -> bool {
    match seq.checked_increment() {
        Some(next) => {
            *cursor = next;
            true
        }
        None => {
            *cursor = seq;
            false
        }
    }
}

/// Pull `b` into `a`, then `a` into `b`.
pub async fn synchronize<A, B>(a: &Endpoint<A>, b: &Endpoint<B>, config: &SyncConfig) -> Result<SyncReport>
where
    A: Store,
    B: Store,
{
    let mut report = pull(a, b, config).await?;
    report.absorb(pull(b, a, config).await?);
    Ok(report)
}

/// [`synchronize`] each neighbouring pair, left to right.
pub async fn synchronize_chain<S: Store>(
    chain: &[&Endpoint<S>],
    config: &SyncConfig,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    for pair in chain.windows(2) {
        report.absorb(synchronize(pair[0], pair[1], config).await?);
    }
    Ok(report)
}

/// [`synchronize_chain`] forwards, then backwards.
///
/// Forwards carries packets from the head of the chain to the tail;
/// backwards carries the tail's lower bounds home, so relays and the
/// sender drop what has been delivered.
pub async fn synchronize_forth_and_back<S: Store>(
    chain: &[&Endpoint<S>],
    config: &SyncConfig,
) -> Result<SyncReport> {
    let mut report = synchronize_chain(chain, config).await?;
    let reversed: Vec<&Endpoint<S>> = chain.iter().rev().copied().collect();
    report.absorb(synchronize_chain(&reversed, config).await?);
    Ok(report)
}
