#![allow(clippy::expect_used)]

use std::sync::Arc;

use cacheproxy_quorum::{
    BackendRef, Item, QuorumClient, QuorumConfig, ScoredRanking,
    testutil::{make_item, make_key, populated_backend},
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rt() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime")
}

/// Creates a client over `replicas` in-memory backends, each pre-populated
/// with `count` keys of `value_size` bytes under `prefix`.
fn populated_client(replicas: usize, prefix: &str, count: usize, value_size: usize) -> QuorumClient {
    let backends: Vec<BackendRef> = (0..replicas)
        .map(|i| {
            Arc::new(populated_backend(&format!("replica-{i}"), prefix, count, value_size))
                as BackendRef
        })
        .collect();
    let ranking = ScoredRanking::new(backends, 64).expect("valid ranking");
    let config = QuorumConfig::builder().n(replicas).w(replicas.div_ceil(2)).build().expect("valid config");
    QuorumClient::new(Arc::new(ranking), config)
}

// ---------------------------------------------------------------------------
// 1. get_operations
// ---------------------------------------------------------------------------

fn get_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_operations");
    let rt = rt();

    // -- hit (varying value sizes) --
    for &value_size in &[64, 1024, 65_536] {
        let client = &populated_client(3, "get", 1, value_size);
        let key = &make_key("get", 0);
        group.throughput(Throughput::Bytes(value_size as u64));
        group.bench_with_input(BenchmarkId::new("hit", value_size), &value_size, |b, _| {
            b.to_async(&rt).iter(|| async move {
                client.get(key).await.expect("get failed");
            });
        });
    }

    // -- confirmed miss --
    {
        let client = &populated_client(3, "get", 1, 64);
        group.bench_function("miss", |b| {
            b.to_async(&rt).iter(|| async move {
                let lookup = client.get("nonexistent").await.expect("get failed");
                assert!(!lookup.is_hit());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. get_multi_operations
// ---------------------------------------------------------------------------

fn get_multi_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_multi_operations");
    let rt = rt();
    let client = &populated_client(3, "multi", 1_000, 256);

    for &batch in &[1, 16, 128] {
        let keys: Vec<String> = (0..batch).map(|i| make_key("multi", i)).collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &keys, |b, keys| {
            b.to_async(&rt).iter(|| async move {
                let outcome = client.get_multi(keys).await.expect("get_multi failed");
                assert_eq!(outcome.items.len(), keys.len());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. write_operations
// ---------------------------------------------------------------------------

fn write_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_operations");
    let rt = rt();

    for &replicas in &[1, 3, 5] {
        let client = &populated_client(replicas, "write", 0, 0);
        let item: &Item = &make_item(256);
        group.bench_with_input(BenchmarkId::new("set", replicas), &replicas, |b, _| {
            b.to_async(&rt).iter(|| async move {
                client.set("write:key", item, false).await.expect("set failed");
            });
        });
    }

    {
        let client = &populated_client(3, "write", 0, 0);
        group.bench_function("incr", |b| {
            b.to_async(&rt).iter(|| async move {
                client.incr("write:counter", 1).await.expect("incr failed");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, get_operations, get_multi_operations, write_operations);
criterion_main!(benches);
