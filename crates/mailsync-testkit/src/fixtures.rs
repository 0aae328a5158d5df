//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Mutex};

use mailsync_core::{EndpointName, Label, Packet, PacketDraft};
use mailsync_endpoint::{Endpoint, EndpointConfig, EndpointInfo, HandlerError};
use mailsync_store::{MemoryStore, SqliteStore, Store};

/// Validated endpoint name. Panics on an invalid name.
pub fn name(s: &str) -> EndpointName {
    EndpointName::new(s).unwrap_or_else(|e| panic!("bad fixture name {s:?}: {e}"))
}

/// Collects every packet delivered to an endpoint, in order.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRecorder {
    packets: Arc<Mutex<Vec<Packet>>>,
}

impl DeliveryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register as a packet handler of `endpoint`.
    pub fn attach<S: Store>(&self, endpoint: &mut Endpoint<S>) {
        let packets = Arc::clone(&self.packets);
        endpoint.add_packet_handler(
            move |_: &EndpointInfo, packet: &Packet| -> Result<(), HandlerError> {
                packets
                    .lock()
                    .map_err(|e| HandlerError::new(e.to_string()))?
                    .push(packet.clone());
                Ok(())
            },
        );
    }

    /// Packets delivered so far.
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An endpoint with a delivery recorder attached.
pub struct EndpointFixture<S: Store> {
    pub endpoint: Endpoint<S>,
    pub recorder: DeliveryRecorder,
}

impl EndpointFixture<MemoryStore> {
    /// An in-memory endpoint with the default configuration.
    pub fn memory(endpoint_name: &str) -> Self {
        Self::from_endpoint(
            Endpoint::new(
                name(endpoint_name),
                MemoryStore::new(endpoint_name),
                EndpointConfig::default(),
            ),
        )
    }
}

impl EndpointFixture<SqliteStore> {
    /// An endpoint over an in-memory SQLite database.
    pub fn sqlite(endpoint_name: &str) -> Self {
        let store = SqliteStore::open_memory(endpoint_name)
            .unwrap_or_else(|e| panic!("open in-memory sqlite: {e}"));
        Self::from_endpoint(Endpoint::new(
            name(endpoint_name),
            store,
            EndpointConfig::default(),
        ))
    }
}

impl<S: Store> EndpointFixture<S> {
    /// Wrap an endpoint, attaching a fresh recorder.
    pub fn from_endpoint(mut endpoint: Endpoint<S>) -> Self {
        let recorder = DeliveryRecorder::new();
        recorder.attach(&mut endpoint);
        Self { endpoint, recorder }
    }

    pub fn name(&self) -> &EndpointName {
        self.endpoint.name()
    }

    /// Packets delivered to this endpoint so far.
    pub fn delivered(&self) -> Vec<Packet> {
        self.recorder.packets()
    }

    /// Send `count` packets to `dst` in one batch; payloads are `"packet <i>"`.
    pub async fn send_numbered(&self, dst: &str, count: usize) -> Vec<Packet> {
        let dst = name(dst);
        self.endpoint
            .send_batch((0..count).collect(), move |_, i: &usize| {
                PacketDraft::complete(dst.clone(), Label(1), format!("packet {i}").into_bytes())
            })
            .await
            .unwrap_or_else(|e| panic!("send_numbered failed: {e}"))
    }
}

/// In-memory fixtures, one per name, in order.
pub fn fixture_chain(names: &[&str]) -> Vec<EndpointFixture<MemoryStore>> {
    names.iter().map(|n| EndpointFixture::memory(n)).collect()
}
