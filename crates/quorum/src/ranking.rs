//! Ranking provider trait.
//!
//! The ranking provider owns the routing policy: which backends serve a key,
//! in which order, and how keys group into shards. The quorum client only
//! consumes this narrow interface and reports back how each contacted
//! backend behaved.

use crate::backend::{Backend, BackendRef};

/// Keys partitioned by shard. The index is the shard id; lists may be empty.
pub type Shards = Vec<Vec<String>>;

/// Orders backends for a key and accepts score feedback.
///
/// Implementations are shared by every caller of a
/// [`QuorumClient`](crate::QuorumClient) and by its concurrent shard tasks,
/// so they must be `Send + Sync` and cheap to call.
pub trait RankingProvider: Send + Sync {
    /// Returns the candidate backends for `key`, best first.
    ///
    /// All keys of one shard must yield the same list.
    fn ranked_backends(&self, key: &str) -> Vec<BackendRef>;

    /// Adjusts the score of `backend` for the shard of `key`.
    ///
    /// `delta` is negative for penalties. `fault` is set when the adjustment
    /// stems from a transport failure rather than ordinary latency scoring.
    /// Must not block the caller meaningfully.
    fn feedback(&self, backend: &dyn Backend, key: &str, delta: f64, fault: bool);

    /// Partitions `keys` into disjoint per-shard groups whose union is `keys`.
    fn split_by_shard(&self, keys: &[String]) -> Shards;
}
