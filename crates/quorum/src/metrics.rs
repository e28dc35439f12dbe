//! Quorum client metrics collection and monitoring
//!
//! This module tracks, per [`QuorumClient`](crate::QuorumClient):
//!
//! - Operation counts (get, get_multi, set, append, incr, delete)
//! - Operation latencies (cumulative microseconds and p50/p95/p99 percentiles)
//! - Read hits and misses
//! - Quorum failures, backend errors absorbed while walking candidates, and failed shards
//!
//! # Memory Ordering
//!
//! All atomic operations use `Ordering::Relaxed`. Each counter is independent and
//! monotonically increasing, so a snapshot may show counters from slightly different
//! instants relative to each other. `reset()` racing with a concurrent increment may
//! lose that increment.
//!
//! # Percentile Tracking
//!
//! Each operation keeps a `LatencyHistogram`, a circular buffer of the most recent
//! 1024 latency values in microseconds, guarded by a [`parking_lot::Mutex`] held only
//! for a single push. Percentiles are computed at snapshot time by sorting a copy.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use cacheproxy_quorum::metrics::{Metrics, Operation};
//!
//! let metrics = Metrics::new();
//!
//! metrics.record(Operation::Get, Duration::from_micros(100));
//! metrics.record_hit();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.get.count, 1);
//! assert_eq!(snapshot.get.avg_latency_us(), 100.0);
//! assert_eq!(snapshot.hit_rate(), 1.0);
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Number of latency samples retained per operation.
const DEFAULT_HISTOGRAM_WINDOW_SIZE: usize = 1024;

/// Quorum-failure rate above which [`Metrics::log_metrics`] warns.
const QUORUM_FAILURE_WARN_RATE: f64 = 0.05;

/// A client operation tracked by [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Single-key read.
    Get,
    /// Batched read.
    GetMulti,
    /// Store.
    Set,
    /// Append to an existing value.
    Append,
    /// Counter increment.
    Incr,
    /// Removal.
    Delete,
}

impl Operation {
    /// Every tracked operation, in snapshot order.
    pub const ALL: [Self; 6] =
        [Self::Get, Self::GetMulti, Self::Set, Self::Append, Self::Incr, Self::Delete];

    /// Returns the span and log name of this operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::GetMulti => "get_multi",
            Self::Set => "set",
            Self::Append => "append",
            Self::Incr => "incr",
            Self::Delete => "delete",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── LatencyPercentiles ──────────────────────────────────────────────────

/// Latency percentiles for a single operation, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// 50th percentile (median) latency in microseconds.
    pub p50: u64,
    /// 95th percentile latency in microseconds.
    pub p95: u64,
    /// 99th percentile latency in microseconds.
    pub p99: u64,
}

// ── LatencyHistogram ────────────────────────────────────────────────────

/// A bounded circular buffer of latency samples.
///
/// Older values are overwritten when the buffer is full.
pub(crate) struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

struct HistogramInner {
    buf: Vec<u64>,
    /// Next write position.
    pos: usize,
    capacity: usize,
}

impl LatencyHistogram {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistogramInner {
                buf: Vec::with_capacity(capacity),
                pos: 0,
                capacity,
            }),
        }
    }

    pub(crate) fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % inner.capacity;
    }

    /// Returns all zeros if no samples have been recorded.
    pub(crate) fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted = {
            let inner = self.inner.lock();
            if inner.buf.is_empty() {
                return LatencyPercentiles::default();
            }
            inner.buf.clone()
        };
        sorted.sort_unstable();
        let len = sorted.len();
        LatencyPercentiles {
            p50: sorted[percentile_index(len, 50)],
            p95: sorted[percentile_index(len, 95)],
            p99: sorted[percentile_index(len, 99)],
        }
    }

    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.buf.clear();
        inner.pos = 0;
    }
}

/// Nearest-rank index: `ceil(percentile/100 * len) - 1`, clamped to the valid range.
fn percentile_index(len: usize, percentile: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (u64::from(percentile) * len as u64).div_ceil(100) as usize;
    rank.saturating_sub(1).min(len - 1)
}

// ── Snapshots ───────────────────────────────────────────────────────────

/// Counters for one operation at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSnapshot {
    /// Number of completed calls.
    pub count: u64,
    /// Cumulative latency in microseconds.
    pub latency_us: u64,
    /// Latency percentiles over the recent window.
    pub percentiles: LatencyPercentiles,
}

impl OperationSnapshot {
    /// Returns the average latency in microseconds.
    #[must_use]
    pub fn avg_latency_us(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.latency_us as f64 / self.count as f64 }
    }
}

/// Metrics snapshot for export.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct MetricsSnapshot {
    /// Single-key reads.
    #[builder(default)]
    pub get: OperationSnapshot,
    /// Batched reads.
    #[builder(default)]
    pub get_multi: OperationSnapshot,
    /// Stores.
    #[builder(default)]
    pub set: OperationSnapshot,
    /// Appends.
    #[builder(default)]
    pub append: OperationSnapshot,
    /// Counter increments.
    #[builder(default)]
    pub incr: OperationSnapshot,
    /// Deletes.
    #[builder(default)]
    pub delete: OperationSnapshot,

    /// Single-key reads that found a value.
    #[builder(default)]
    pub hits: u64,
    /// Single-key reads that confirmed a miss.
    #[builder(default)]
    pub misses: u64,

    /// Operations that returned a quorum failure.
    #[builder(default)]
    pub quorum_failures: u64,
    /// Per-backend transport errors absorbed while walking candidates.
    #[builder(default)]
    pub backend_errors: u64,
    /// Batched-read shards that resolved nothing and failed.
    #[builder(default)]
    pub shard_failures: u64,
}

impl MetricsSnapshot {
    /// Returns the snapshot of `op`.
    #[must_use]
    pub fn operation(&self, op: Operation) -> &OperationSnapshot {
        match op {
            Operation::Get => &self.get,
            Operation::GetMulti => &self.get_multi,
            Operation::Set => &self.set,
            Operation::Append => &self.append,
            Operation::Incr => &self.incr,
            Operation::Delete => &self.delete,
        }
    }

    /// Returns the total operations count.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        Operation::ALL.iter().map(|op| self.operation(*op).count).sum()
    }

    /// Returns the read hit rate (0.0 - 1.0) over confirmed single-key outcomes.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    /// Returns the quorum-failure rate (0.0 - 1.0).
    #[must_use]
    pub fn quorum_failure_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 { 0.0 } else { self.quorum_failures as f64 / total as f64 }
    }
}

// ── Metrics ─────────────────────────────────────────────────────────────

/// Collects operation counts, latencies and quorum outcomes for a client.
///
/// Cloning is cheap; clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct OperationStats {
    count: AtomicU64,
    latency_us: AtomicU64,
    histogram: LatencyHistogram,
}

impl OperationStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
            histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
        }
    }

    fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            count: self.count.load(Ordering::Relaxed),
            latency_us: self.latency_us.load(Ordering::Relaxed),
            percentiles: self.histogram.percentiles(),
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.latency_us.store(0, Ordering::Relaxed);
        self.histogram.reset();
    }
}

struct MetricsInner {
    // Indexed by `Operation::index`
    operations: [OperationStats; 6],

    hits: AtomicU64,
    misses: AtomicU64,

    quorum_failures: AtomicU64,
    backend_errors: AtomicU64,
    shard_failures: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                operations: std::array::from_fn(|_| OperationStats::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                quorum_failures: AtomicU64::new(0),
                backend_errors: AtomicU64::new(0),
                shard_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Records one completed call of `op`.
    pub fn record(&self, op: Operation, duration: Duration) {
        let us = duration.as_micros() as u64;
        let stats = &self.inner.operations[op.index()];
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats.latency_us.fetch_add(us, Ordering::Relaxed);
        stats.histogram.record(us);
    }

    /// Records a single-key read that found a value.
    pub fn record_hit(&self) {
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a single-key read that confirmed a miss.
    pub fn record_miss(&self) {
        self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation that ended in a quorum failure.
    pub fn record_quorum_failure(&self) {
        self.inner.quorum_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` per-backend transport errors.
    pub fn record_backend_errors(&self, count: usize) {
        if count > 0 {
            self.inner.backend_errors.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Records a failed batched-read shard.
    pub fn record_shard_failure(&self) {
        self.inner.shard_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of current metrics.
    ///
    /// Individual counter values are accurate, but counters may reflect
    /// different points in time relative to each other.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let ops = &self.inner.operations;
        MetricsSnapshot::builder()
            .get(ops[Operation::Get.index()].snapshot())
            .get_multi(ops[Operation::GetMulti.index()].snapshot())
            .set(ops[Operation::Set.index()].snapshot())
            .append(ops[Operation::Append.index()].snapshot())
            .incr(ops[Operation::Incr.index()].snapshot())
            .delete(ops[Operation::Delete.index()].snapshot())
            .hits(self.inner.hits.load(Ordering::Relaxed))
            .misses(self.inner.misses.load(Ordering::Relaxed))
            .quorum_failures(self.inner.quorum_failures.load(Ordering::Relaxed))
            .backend_errors(self.inner.backend_errors.load(Ordering::Relaxed))
            .shard_failures(self.inner.shard_failures.load(Ordering::Relaxed))
            .build()
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        for stats in &self.inner.operations {
            stats.reset();
        }
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        self.inner.quorum_failures.store(0, Ordering::Relaxed);
        self.inner.backend_errors.store(0, Ordering::Relaxed);
        self.inner.shard_failures.store(0, Ordering::Relaxed);
    }

    /// Logs current metrics at INFO level.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        if snapshot.total_operations() == 0 {
            return;
        }

        info!(
            get_count = snapshot.get.count,
            get_multi_count = snapshot.get_multi.count,
            set_count = snapshot.set.count,
            append_count = snapshot.append.count,
            incr_count = snapshot.incr.count,
            delete_count = snapshot.delete.count,
            avg_get_latency_us = snapshot.get.avg_latency_us(),
            avg_get_multi_latency_us = snapshot.get_multi.avg_latency_us(),
            avg_set_latency_us = snapshot.set.avg_latency_us(),
            get_p50 = snapshot.get.percentiles.p50,
            get_p99 = snapshot.get.percentiles.p99,
            set_p99 = snapshot.set.percentiles.p99,
            hit_rate = snapshot.hit_rate(),
            backend_errors = snapshot.backend_errors,
            shard_failures = snapshot.shard_failures,
            quorum_failures = snapshot.quorum_failures,
            "Quorum metrics snapshot"
        );

        if snapshot.quorum_failure_rate() > QUORUM_FAILURE_WARN_RATE {
            warn!(
                quorum_failure_rate = snapshot.quorum_failure_rate(),
                quorum_failures = snapshot.quorum_failures,
                total_ops = snapshot.total_operations(),
                "High quorum failure rate detected"
            );
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Exposes the [`Metrics`] instance of a client.
pub trait MetricsCollector {
    /// Returns a reference to the metrics collector.
    fn metrics(&self) -> &Metrics;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    // ── LatencyHistogram ────────────────────────────────────────────────

    #[test]
    fn test_histogram_empty_percentiles() {
        let h = LatencyHistogram::new(16);
        assert_eq!(h.percentiles(), LatencyPercentiles::default());
    }

    #[test]
    fn test_histogram_known_distribution() {
        let h = LatencyHistogram::new(1024);
        for v in 1..=100 {
            h.record(v);
        }
        let p = h.percentiles();
        assert_eq!(p.p50, 50);
        assert_eq!(p.p95, 95);
        assert_eq!(p.p99, 99);
    }

    #[test]
    fn test_histogram_circular_eviction() {
        let h = LatencyHistogram::new(10);
        for v in 1..=20 {
            h.record(v);
        }
        // Buffer holds 11..=20
        let p = h.percentiles();
        assert_eq!(p.p50, 15);
        assert_eq!(p.p99, 20);
    }

    #[test]
    fn test_histogram_reset() {
        let h = LatencyHistogram::new(16);
        h.record(100);
        h.reset();
        assert_eq!(h.percentiles(), LatencyPercentiles::default());
    }

    #[rstest]
    #[case::empty(0, 50, 0)]
    #[case::single_p50(1, 50, 0)]
    #[case::single_p99(1, 99, 0)]
    #[case::hundred_p50(100, 50, 49)]
    #[case::hundred_p95(100, 95, 94)]
    #[case::hundred_p99(100, 99, 98)]
    fn test_percentile_index(#[case] len: usize, #[case] percentile: u32, #[case] expected: usize) {
        assert_eq!(percentile_index(len, percentile), expected);
    }

    // ── Metrics ─────────────────────────────────────────────────────────

    #[rstest]
    #[case::get(Operation::Get)]
    #[case::get_multi(Operation::GetMulti)]
    #[case::set(Operation::Set)]
    #[case::append(Operation::Append)]
    #[case::incr(Operation::Incr)]
    #[case::delete(Operation::Delete)]
    fn test_record_lands_in_its_own_slot(#[case] op: Operation) {
        let metrics = Metrics::new();
        metrics.record(op, Duration::from_micros(40));
        metrics.record(op, Duration::from_micros(60));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operation(op).count, 2);
        assert_eq!(snapshot.operation(op).avg_latency_us(), 50.0);
        assert_eq!(snapshot.total_operations(), 2);
        for other in Operation::ALL.into_iter().filter(|o| *o != op) {
            assert_eq!(snapshot.operation(other).count, 0, "{other} should be untouched");
        }
    }

    #[test]
    fn test_hit_rate_and_quorum_failure_rate() {
        let metrics = Metrics::new();
        for _ in 0..4 {
            metrics.record(Operation::Get, Duration::from_micros(1));
        }
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_quorum_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hit_rate(), 0.75);
        assert_eq!(snapshot.quorum_failure_rate(), 0.25);
    }

    #[test]
    fn test_rates_are_zero_without_operations() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.hit_rate(), 0.0);
        assert_eq!(snapshot.quorum_failure_rate(), 0.0);
        assert_eq!(snapshot.get.avg_latency_us(), 0.0);
    }

    #[test]
    fn test_backend_errors_accumulate() {
        let metrics = Metrics::new();
        metrics.record_backend_errors(0);
        metrics.record_backend_errors(2);
        metrics.record_backend_errors(1);
        metrics.record_shard_failure();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.backend_errors, 3);
        assert_eq!(snapshot.shard_failures, 1);
    }

    #[test]
    fn test_clones_share_counters_and_reset() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record(Operation::Set, Duration::from_micros(10));
        clone.record_quorum_failure();
        assert_eq!(metrics.snapshot().set.count, 1);

        metrics.reset();
        let snapshot = clone.snapshot();
        assert_eq!(snapshot.total_operations(), 0);
        assert_eq!(snapshot.quorum_failures, 0);
        assert_eq!(snapshot.set.percentiles, LatencyPercentiles::default());
    }

    #[test]
    fn test_snapshot_builder_defaults() {
        let snapshot = MetricsSnapshot::builder().hits(5).build();
        assert_eq!(snapshot.hits, 5);
        assert_eq!(snapshot.misses, 0);
        assert_eq!(snapshot.get, OperationSnapshot::default());
    }

    #[test]
    fn test_log_metrics_with_and_without_traffic() {
        let metrics = Metrics::new();
        metrics.log_metrics();
        metrics.record(Operation::Delete, Duration::from_micros(5));
        metrics.record_quorum_failure();
        metrics.log_metrics();
    }
}
