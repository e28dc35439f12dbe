//! Concurrent access stress tests for `QuorumClient`.
//!
//! These tests drive one shared client from many tasks at once to detect
//! deadlocks, lost updates and cross-talk between concurrent shard reads.
//! They are ignored by default for CI runtime control:
//!
//! ```bash
//! cargo test -p cacheproxy-quorum --test concurrent_stress -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::panic)]

use std::{collections::HashSet, sync::Arc, time::Duration};

use cacheproxy_quorum::{
    BackendRef, Item, MemoryBackend, MetricsCollector, QuorumClient, QuorumConfig, ScoredRanking,
    testutil::{make_key, populated_backend},
};
use tokio::task::JoinSet;

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 16;

/// Number of operations each task performs.
const OPS_PER_TASK: usize = 100;

/// Number of keys seeded on every replica.
const SEEDED_KEYS: usize = 256;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn seeded_client(n: usize, w: usize) -> (QuorumClient, Vec<Arc<MemoryBackend>>) {
    let replicas: Vec<Arc<MemoryBackend>> = ["r0", "r1", "r2"]
        .into_iter()
        .map(|addr| Arc::new(populated_backend(addr, "seed", SEEDED_KEYS, 32)))
        .collect();
    let backends: Vec<BackendRef> = replicas.iter().map(|b| Arc::clone(b) as BackendRef).collect();
    let ranking = ScoredRanking::new(backends, 32).expect("valid ranking");
    let config = QuorumConfig::builder().n(n).w(w).r(1).build().expect("valid config");
    (QuorumClient::new(Arc::new(ranking), config), replicas)
}

// ---------------------------------------------------------------------------
// Test: Parallel batched reads see exactly the requested keys
// ---------------------------------------------------------------------------

/// Each task repeatedly reads its own window of seeded keys plus keys that
/// were never written. Every result must contain exactly the seeded subset
/// of its own request, no matter how shard tasks interleave.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn parallel_get_multi_no_cross_talk() {
    let (client, _) = seeded_client(3, 2);

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let client = client.clone();
        set.spawn(async move {
            for round in 0..OPS_PER_TASK / 10 {
                let start = (task_id * 13 + round * 7) % SEEDED_KEYS;
                let mut keys: Vec<String> =
                    (start..start + 12).map(|i| make_key("seed", i % SEEDED_KEYS)).collect();
                keys.push(make_key("absent", task_id));

                let outcome = client.get_multi(&keys).await.expect("get_multi should succeed");
                let expected: HashSet<&String> = keys.iter().filter(|k| k.starts_with("seed")).collect();
                let got: HashSet<&String> = outcome.items.keys().collect();
                assert_eq!(got, expected, "task {task_id} round {round}");
            }
        });
    }

    while let Some(result) = set.join_next().await {
        result.expect("task should not panic");
    }

    let snapshot = client.metrics().snapshot();
    assert_eq!(snapshot.get_multi.count, (CONCURRENCY * OPS_PER_TASK / 10) as u64);
    assert_eq!(snapshot.shard_failures, 0);
}

// ---------------------------------------------------------------------------
// Test: Parallel counters lose no increment on the primary
// ---------------------------------------------------------------------------

/// All tasks increment one counter through the client. The highest value
/// any replica reports must account for every increment.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn parallel_incr_same_counter() {
    let (client, replicas) = seeded_client(3, 3);
    client.set("hits", &Item::new("0"), false).await.expect("seed counter");

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let client = client.clone();
        set.spawn(async move {
            for _ in 0..OPS_PER_TASK {
                let outcome = client.incr("hits", 1).await.expect("incr should succeed");
                assert!(outcome.value > 0);
            }
        });
    }
    while let Some(result) = set.join_next().await {
        result.expect("task should not panic");
    }

    let total = (CONCURRENCY * OPS_PER_TASK) as u64;
    for replica in &replicas {
        let stored = replica.peek("hits").expect("counter on every replica");
        assert_eq!(stored.body.as_ref(), total.to_string().as_bytes(), "{replica:?}");
    }
}

// ---------------------------------------------------------------------------
// Test: Mixed readers and writers complete without deadlock
// ---------------------------------------------------------------------------

/// Half the tasks write distinct keys while the other half read and delete.
/// Everything must finish within a generous deadline.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn mixed_workload_completes() {
    let (client, _) = seeded_client(3, 2);

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let client = client.clone();
        set.spawn(async move {
            for i in 0..OPS_PER_TASK {
                let key = make_key(&format!("task{task_id}"), i);
                if task_id % 2 == 0 {
                    client.set(&key, &Item::new(format!("v{i}")), false).await.expect("set");
                    client.append(&key, b"+").await.expect("append");
                } else {
                    client.get(&make_key("seed", i % SEEDED_KEYS)).await.expect("get");
                    client.delete(&key).await.expect("delete");
                }
            }
        });
    }

    let drained = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(result) = set.join_next().await {
            result.expect("task should not panic");
        }
    })
    .await;
    assert!(drained.is_ok(), "mixed workload deadlocked");

    let lookup = client.get(&make_key("task0", 0)).await.expect("get");
    assert_eq!(lookup.item.map(|i| i.body), Some("v0+".into()));
}
