//! Concurrency tests for the shared dedup hash set and registry
//!
//! The seen-hash set is fed by multiple chunk-generation workers per outbound
//! connection; insert-if-absent must be atomic and the transform must stay
//! correct without a global lock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use subchannel_protocol::cache::{DeduplicationCache, ExpansionCache, PARTITION_SIZE};
use subchannel_protocol::core::message::{ChunkDataMessage, CHUNK_DATA_TYPE_ID};
use subchannel_protocol::core::MessageTypeRegistry;

#[test]
fn test_racing_insert_if_absent_reports_exactly_one_winner() {
    let cache = Arc::new(DeduplicationCache::new());
    let winners = Arc::new(AtomicUsize::new(0));
    let threads = 16;

    std::thread::scope(|scope| {
        for _ in 0..threads {
            let cache = cache.clone();
            let winners = winners.clone();
            scope.spawn(move || {
                if cache.insert_if_absent(0xFEED_FACE_DEAD_BEEF) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_racing_inserts_of_distinct_hashes_all_win() {
    let cache = Arc::new(DeduplicationCache::new());
    let threads = 8;
    let per_thread = 1000u64;

    std::thread::scope(|scope| {
        for t in 0..threads {
            let cache = cache.clone();
            scope.spawn(move || {
                for i in 0..per_thread {
                    assert!(cache.insert_if_absent((t as u64) << 32 | i));
                }
            });
        }
    });

    assert_eq!(cache.len(), threads * per_thread as usize);
}

/// Multiple workers transform disjoint chunk snapshots against one shared
/// session cache; every output must still expand correctly on its own
/// receiver.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_transforms_share_one_cache() {
    use tokio::task::JoinSet;

    let cache = Arc::new(DeduplicationCache::new());
    let mut tasks = JoinSet::new();

    for worker in 0..8u8 {
        let cache = cache.clone();
        tasks.spawn(async move {
            let receiver = ExpansionCache::new();
            // Worker-unique content so expansions never depend on records
            // another worker emitted first
            let snapshot = vec![worker + 1; 4 * PARTITION_SIZE + 99];
            for _ in 0..50 {
                let reduced = cache.transform(&snapshot);
                // First reduction teaches this receiver the content; later
                // all-duplicate reductions must resolve against it
                let restored = receiver.expand(&reduced).expect("expand");
                assert_eq!(restored, snapshot);
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.expect("worker panicked");
    }

    // 8 workers x 2 distinct partitions each (body + padded tail)
    assert_eq!(cache.len(), 16);
}

#[test]
fn test_registry_resolution_concurrent_with_registration() {
    let registry = Arc::new(MessageTypeRegistry::new());
    registry
        .register(CHUNK_DATA_TYPE_ID, 1, 1 << 20, || {
            Box::<ChunkDataMessage>::default()
        })
        .expect("seed registry");

    std::thread::scope(|scope| {
        // Dispatch threads resolving the established type
        for _ in 0..4 {
            let registry = registry.clone();
            scope.spawn(move || {
                for _ in 0..10_000 {
                    let ty = registry.resolve(CHUNK_DATA_TYPE_ID).expect("resolves");
                    assert_eq!(ty.id(), CHUNK_DATA_TYPE_ID);
                }
            });
        }
        // A late registration on another connection's startup path
        let registry = registry.clone();
        scope.spawn(move || {
            registry
                .register(90, 1, 64, || Box::<ChunkDataMessage>::default())
                .expect("late registration");
        });
    });

    assert_eq!(registry.len(), 2);
}
