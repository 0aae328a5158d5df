//! Properties of whole relay chains.

use proptest::prelude::*;

use mailsync_core::PacketDraft;
use mailsync_sync::{synchronize_chain, synchronize_forth_and_back, SyncConfig};

use crate::fixtures::{fixture_chain, name};
use crate::generators::{label, payload, PacketParams};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap()
}

const NAMES: [&str; 5] = ["n0", "n1", "n2", "n3", "n4"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the chain length and however often a walk is cut short,
    /// the tail gets every packet exactly once and in order, and a final
    /// forth-and-back leaves every mailbox empty.
    #[test]
    fn test_chain_delivers_exactly_once(
        len in 2usize..=5,
        count in 0usize..30,
        steps in 1usize..6,
    ) {
        runtime().block_on(async {
            let chain = fixture_chain(&NAMES[..len]);
            let tail = NAMES[len - 1];
            let sent = chain[0].send_numbered(tail, count).await;
            let endpoints: Vec<_> = chain.iter().map(|f| &f.endpoint).collect();

            let limited = SyncConfig {
                max_steps_per_channel: Some(steps),
                ..SyncConfig::default()
            };
            let mut rounds = 0;
            while chain[len - 1].recorder.len() < count {
                rounds += 1;
                assert!(rounds <= count + len, "no progress after {rounds} rounds");
                synchronize_chain(&endpoints, &limited).await.unwrap();
            }
            synchronize_forth_and_back(&endpoints, &SyncConfig::default()).await.unwrap();

            assert_eq!(chain[len - 1].delivered(), sent);
            for fixture in &chain {
                assert_eq!(fixture.endpoint.total_packet_count().await.unwrap(), 0);
            }
        });
    }

    /// Replaying packets at a relay in any order, any number of times,
    /// stores each exactly once.
    #[test]
    fn test_relay_put_is_idempotent(
        params in prop::collection::vec(any::<PacketParams>(), 1..10),
        replays in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
    ) {
        runtime().block_on(async {
            let chain = fixture_chain(&["relay"]);
            let relay = &chain[0];
            let mut packets: Vec<_> = params.into_iter().map(|p| p.into_packet()).collect();
            packets.retain(|p| p.dst != "relay");
            packets.sort_by_key(|p| (p.src.clone(), p.dst.clone(), p.seq_number));
            packets.dedup_by(|a, b| a.same_key(b));

            for packet in &packets {
                relay.endpoint.put_packet(packet.clone()).await.unwrap();
            }
            for index in &replays {
                if packets.is_empty() {
                    break;
                }
                let packet = index.get(&packets).clone();
                relay.endpoint.put_packet(packet).await.unwrap();
            }

            let stored = relay.endpoint.snapshot().await.unwrap().packets;
            assert_eq!(stored.len(), packets.len());
            assert!(relay.recorder.is_empty());
        });
    }

    /// Raising a lower bound on a channel the endpoint only sends on keeps
    /// exactly the packets at or above it, fragments included.
    #[test]
    fn test_lower_bound_eviction(
        labels in prop::collection::vec(label(), 1..20),
        cut in any::<prop::sample::Index>(),
        data in payload(16),
    ) {
        runtime().block_on(async {
            let chain = fixture_chain(&["src"]);
            let dst = name("far");
            let drafts: Vec<_> = labels
                .iter()
                .map(|l| PacketDraft::complete(dst.clone(), *l, data.clone()))
                .collect();
            let sent = chain[0]
                .endpoint
                .send_batch(drafts, |_, d| d.clone())
                .await
                .unwrap();
            let floor = cut.get(&sent).seq_number;

            chain[0]
                .endpoint
                .update_lower_bound(&name("src"), &dst, Some(floor))
                .await
                .unwrap();

            // Not the destination, so the default policy protects nothing.
            let kept = chain[0].endpoint.snapshot().await.unwrap().packets;
            let expected: Vec<_> = sent.iter().filter(|p| p.seq_number >= floor).cloned().collect();
            assert_eq!(kept, expected);
            assert_eq!(
                chain[0].endpoint.lower_bound(&name("src"), &dst).await.unwrap(),
                floor
            );
        });
    }
}
