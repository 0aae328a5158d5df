//! A relay chain simulation.
//!
//! The head of a chain of mailboxes sends packets to the tail, then the chain
//! is synchronized forth and back. Used by the `mailsync-demo` binary and
//! the scenario tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use mailsync_core::{EndpointName, Label, Packet, PacketDraft};
use mailsync_endpoint::{Endpoint, EndpointConfig, EndpointInfo, EndpointSnapshot, HandlerError};
use mailsync_store::{MemoryStore, SqliteStore, Store};
use mailsync_sync::{synchronize_forth_and_back, SyncConfig, SyncReport};

use crate::error::{MailsyncError, Result};

/// Minimum payload size of each simulated packet, in bytes.
pub const SIMULATED_PAYLOAD_LEN: usize = 3;

pub const SIMULATED_LABEL: Label = Label::new(1);

/// What to simulate.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Packets the head of the chain sends to the tail.
    pub packet_count: usize,
    pub endpoint: EndpointConfig,
    pub sync: SyncConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            packet_count: 39,
            endpoint: EndpointConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// The result of [`run_simulation`].
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    /// Packets the head sent, in sending order.
    pub sent: Vec<Packet>,
    /// Packets the tail's handlers saw, in delivery order.
    pub delivered: Vec<Packet>,
    /// Counters of the whole forth-and-back pass.
    pub report: SyncReport,
    /// Final state of every mailbox, head first.
    pub snapshots: Vec<EndpointSnapshot>,
}

/// In-memory mailboxes, one per name.
pub fn memory_chain(names: &[EndpointName], config: &EndpointConfig) -> Vec<Endpoint<MemoryStore>> {
    names
        .iter()
        .map(|name| Endpoint::new(name.clone(), MemoryStore::new(name.as_str()), config.clone()))
        .collect()
}

/// Empty SQLite-backed mailboxes, one file `<dir>/<name>.db` per name.
pub async fn sqlite_chain(
    dir: &Path,
    names: &[EndpointName],
    config: &EndpointConfig,
) -> Result<Vec<Endpoint<SqliteStore>>> {
    std::fs::create_dir_all(dir)?;
    let mut chain = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(format!("{name}.db"));
        chain.push(Endpoint::open_and_reset(&path, config.clone()).await?);
    }
    Ok(chain)
}

/// Send from the head of `chain` to its tail, then synchronize forth and
/// back.
pub async fn run_simulation<S: Store>(
    mut chain: Vec<Endpoint<S>>,
    config: &SimulationConfig,
) -> Result<SimulationOutcome> {
    if chain.len() < 2 {
        return Err(MailsyncError::InvalidOperation(format!(
            "a simulation needs at least two mailboxes, got {}",
            chain.len()
        )));
    }

    let inbox: Arc<Mutex<Vec<Packet>>> = Arc::new(Mutex::new(Vec::new()));
    if let Some(tail) = chain.last_mut() {
        let sink = Arc::clone(&inbox);
        tail.add_packet_handler(
            move |_: &EndpointInfo, packet: &Packet| -> std::result::Result<(), HandlerError> {
                sink.lock()
                    .map_err(|e| HandlerError::new(e.to_string()))?
                    .push(packet.clone());
                Ok(())
            },
        );
    }

    let head = &chain[0];
    let tail_name = chain[chain.len() - 1].name().clone();
    let sent = head
        .send_batch((0..config.packet_count).collect(), move |_, i: &usize| {
            PacketDraft::complete(
                tail_name.clone(),
                SIMULATED_LABEL,
                format!("{i:0width$}", width = SIMULATED_PAYLOAD_LEN).into_bytes(),
            )
        })
        .await?;
    tracing::info!(
        src = %head.name(),
        count = sent.len(),
        mailboxes = chain.len(),
        "sent packets, synchronizing"
    );

    let refs: Vec<&Endpoint<S>> = chain.iter().collect();
    let report = synchronize_forth_and_back(&refs, &config.sync).await?;

    let mut snapshots = Vec::with_capacity(chain.len());
    for endpoint in &chain {
        snapshots.push(endpoint.snapshot().await?);
    }

    let delivered = inbox
        .lock()
        .map(|mut packets| std::mem::take(&mut *packets))
        .map_err(|e| MailsyncError::InvalidOperation(e.to_string()))?;

    tracing::info!(
        delivered = delivered.len(),
        stored = report.stored,
        skipped = report.skipped,
        "simulation complete"
    );
    Ok(SimulationOutcome {
        sent,
        delivered,
        report,
        snapshots,
    })
}
