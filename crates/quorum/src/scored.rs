//! Score-based ranking provider.
//!
//! [`ScoredRanking`] hashes each key into one of a fixed number of buckets
//! and keeps a score per (bucket, backend) pair. Candidates for a key are
//! its bucket's backends ordered by descending score. Feedback from the
//! quorum client lowers scores, so slow or failing backends sink.
//!
//! Ties, including the all-zero initial state, are broken by rotating the
//! configured backend order by the bucket index. Fresh buckets therefore
//! start with different primaries.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    backend::{Backend, BackendRef},
    error::ConfigError,
    ranking::{RankingProvider, Shards},
};

/// Ranks backends per key bucket by accumulated feedback score.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cacheproxy_quorum::{BackendRef, MemoryBackend, RankingProvider, ScoredRanking};
///
/// let backends: Vec<BackendRef> =
///     vec![Arc::new(MemoryBackend::new("a")), Arc::new(MemoryBackend::new("b"))];
/// let ranking = ScoredRanking::new(backends, 16)?;
///
/// let ranked = ranking.ranked_backends("user:1");
/// assert_eq!(ranked.len(), 2);
///
/// // A fault demotes the primary for this key's bucket.
/// ranking.feedback(ranked[0].as_ref(), "user:1", -10.0, true);
/// assert_eq!(ranking.ranked_backends("user:1")[1].addr(), ranked[0].addr());
/// # Ok::<(), cacheproxy_quorum::ConfigError>(())
/// ```
pub struct ScoredRanking {
    backends: Vec<BackendRef>,
    index: HashMap<String, usize>,
    buckets: usize,
    /// `scores[bucket][backend]`
    scores: RwLock<Vec<Vec<f64>>>,
    faults: Vec<AtomicU64>,
}

impl ScoredRanking {
    /// Creates a ranking over `backends` with `buckets` key buckets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `backends` is empty or `buckets` is zero.
    pub fn new(backends: Vec<BackendRef>, buckets: usize) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::Empty { field: "backends" });
        }
        if buckets == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "buckets",
                min: "1".into(),
                value: "0".into(),
            });
        }

        let index = backends.iter().enumerate().map(|(i, b)| (b.addr().to_owned(), i)).collect();
        let faults = backends.iter().map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            scores: RwLock::new(vec![vec![0.0; backends.len()]; buckets]),
            backends,
            index,
            buckets,
            faults,
        })
    }

    /// Returns the number of key buckets.
    #[must_use]
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Returns the bucket `key` hashes into.
    #[must_use]
    pub fn bucket_of(&self, key: &str) -> usize {
        crc32fast::hash(key.as_bytes()) as usize % self.buckets
    }

    /// Returns the current score of `addr` in the bucket of `key`.
    #[must_use]
    pub fn score(&self, addr: &str, key: &str) -> Option<f64> {
        let idx = *self.index.get(addr)?;
        let bucket = self.bucket_of(key);
        self.scores.read().get(bucket).and_then(|row| row.get(idx).copied())
    }

    /// Returns how many fault signals `addr` has received across all buckets.
    #[must_use]
    pub fn faults(&self, addr: &str) -> u64 {
        self.index
            .get(addr)
            .and_then(|&idx| self.faults.get(idx))
            .map_or(0, |f| f.load(Ordering::Relaxed))
    }

    fn order_for_bucket(&self, bucket: usize) -> Vec<usize> {
        let n = self.backends.len();
        let rotation = bucket % n;
        let scores = self.scores.read();
        let row = &scores[bucket];

        let mut order: Vec<usize> = (0..n).map(|i| (i + rotation) % n).collect();
        // Stable sort keeps the rotation order among equal scores.
        order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
        order
    }
}

impl RankingProvider for ScoredRanking {
    fn ranked_backends(&self, key: &str) -> Vec<BackendRef> {
        self.order_for_bucket(self.bucket_of(key))
            .into_iter()
            .map(|i| BackendRef::clone(&self.backends[i]))
            .collect()
    }

    fn feedback(&self, backend: &dyn Backend, key: &str, delta: f64, fault: bool) {
        let Some(&idx) = self.index.get(backend.addr()) else {
            debug!(backend = backend.addr(), "feedback for unknown backend ignored");
            return;
        };
        let bucket = self.bucket_of(key);
        if let Some(score) = self.scores.write().get_mut(bucket).and_then(|row| row.get_mut(idx)) {
            *score += delta;
        }
        if fault {
            self.faults[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    fn split_by_shard(&self, keys: &[String]) -> Shards {
        let mut shards: Shards = vec![Vec::new(); self.buckets()];
        for key in keys {
            let bucket = self.bucket_of(key);
            shards[bucket].push(key.clone());
        }
        shards
    }
}

impl std::fmt::Debug for ScoredRanking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoredRanking")
            .field("backends", &self.backends.iter().map(|b| b.addr()).collect::<Vec<_>>())
            .field("buckets", &self.buckets())
            .finish()
    }
}
