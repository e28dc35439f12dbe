//! The quorum client.
//!
//! [`QuorumClient`] composes a [`RankingProvider`] and its backends into
//! replicated cache operations governed by N/W/R:
//!
//! - **Reads** walk the ranked candidates until one returns the value, or
//!   until N backends were tried and R of them answered without error, which
//!   confirms a miss.
//! - **Batched reads** split keys by shard and read every shard concurrently.
//!   A partial result is a success; callers compare against the requested
//!   keys to find gaps.
//! - **Writes** walk until W backends acknowledged and N were tried. `set`
//!   and `append` fail below W. `incr` succeeds whenever any backend reported
//!   a positive counter. `delete` tolerates a single backend error.
//!
//! Every contacted backend is scored through [`RankingProvider::feedback`]
//! (see [`feedback`](crate::feedback)).

use std::{
    collections::{HashMap, HashSet},
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::task::JoinSet;
use tracing::{Instrument, debug, warn};

use crate::{
    backend::BackendRef,
    config::QuorumConfig,
    error::{BackendResult, QuorumError, QuorumResult},
    feedback::Penalty,
    metrics::{Metrics, MetricsCollector, Operation},
    ranking::RankingProvider,
    types::{CounterOutcome, DeleteOutcome, Item, Lookup, MultiGetOutcome, WriteOutcome},
    walk::{StopRule, WalkPolicy, quorum_walk},
};

/// Number of leading candidates reported as targets of a confirmed miss.
const MISS_TARGET_SAMPLE: usize = 3;

/// Delete succeeds with no confirmation as long as fewer backends failed.
const DELETE_ERROR_TOLERANCE: usize = 2;

/// Replicated cache client over a ranked pool of backends.
///
/// The client holds no per-call state. Clones share the ranking provider
/// and metrics and may be used concurrently from any task.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cacheproxy_quorum::{
///     BackendRef, Item, MemoryBackend, QuorumClient, QuorumConfig, ScoredRanking,
/// };
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backends: Vec<BackendRef> = ["a", "b", "c"]
///     .into_iter()
///     .map(|addr| Arc::new(MemoryBackend::new(addr)) as BackendRef)
///     .collect();
/// let ranking = Arc::new(ScoredRanking::new(backends, 16).unwrap());
/// let client = QuorumClient::new(ranking, QuorumConfig::default());
///
/// let written = client.set("greeting", &Item::new("hello"), false).await.unwrap();
/// assert_eq!(written.targets.len(), 3);
///
/// let lookup = client.get("greeting").await.unwrap();
/// assert_eq!(lookup.item.unwrap().body.as_ref(), b"hello");
/// # });
/// ```
#[derive(Clone)]
pub struct QuorumClient {
    ranking: Arc<dyn RankingProvider>,
    config: QuorumConfig,
    metrics: Metrics,
}

impl QuorumClient {
    /// Creates a client routing through `ranking` with the given quorum parameters.
    pub fn new(ranking: Arc<dyn RankingProvider>, config: QuorumConfig) -> Self {
        Self { ranking, config, metrics: Metrics::new() }
    }

    /// Returns the quorum configuration.
    #[must_use]
    pub fn config(&self) -> &QuorumConfig {
        &self.config
    }

    /// Returns the ranking provider.
    #[must_use]
    pub fn ranking(&self) -> &Arc<dyn RankingProvider> {
        &self.ranking
    }

    /// Reads one key.
    ///
    /// Candidates are read strictly in rank order. The first backend holding
    /// the value serves it and is the only target; every backend ranked ahead
    /// of it is penalized as skipped. A miss is confirmed once N candidates
    /// were tried and R answered without a transport error; its targets are
    /// the first three candidates.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::ReadQuorumNotMet`] if the candidates ran out
    /// before a value was found or a miss confirmed.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, key: &str) -> QuorumResult<Lookup> {
        let result = self.timed(Operation::Get, self.read_one(key)).await;
        match &result {
            Ok(lookup) if lookup.is_hit() => self.metrics.record_hit(),
            Ok(_) => self.metrics.record_miss(),
            Err(_) => {},
        }
        result
    }

    async fn read_one(&self, key: &str) -> QuorumResult<Lookup> {
        let candidates = self.ranking.ranked_backends(key);
        let (n, r) = (self.config.n(), self.config.r());
        let mut responded = 0;
        let mut errors = 0;
        let mut last_error = None;

        for (i, backend) in candidates.iter().enumerate() {
            let started = Instant::now();
            match backend.get(key).await {
                Err(err) => {
                    debug!(backend = backend.addr(), key, error = %err, "backend read failed");
                    errors += 1;
                    self.penalize(Penalty::FAULT, backend, key);
                    last_error = Some(err);
                },
                Ok(found) => {
                    responded += 1;
                    self.penalize(Penalty::latency(started.elapsed()), backend, key);
                    if let Some(item) = found {
                        for skipped in &candidates[..i] {
                            self.penalize(Penalty::SKIPPED, skipped, key);
                        }
                        self.metrics.record_backend_errors(errors);
                        return Ok(Lookup {
                            item: Some(item),
                            targets: vec![backend.addr().to_owned()],
                        });
                    }
                },
            }

            if responded >= r && i + 1 >= n {
                self.metrics.record_backend_errors(errors);
                return Ok(Lookup {
                    item: None,
                    targets: candidates
                        .iter()
                        .take(MISS_TARGET_SAMPLE)
                        .map(|b| b.addr().to_owned())
                        .collect(),
                });
            }
        }

        self.metrics.record_backend_errors(errors);
        Err(QuorumError::ReadQuorumNotMet {
            key: key.to_owned(),
            attempted: candidates.len(),
            responded,
            required: r,
            last_error,
        })
    }

    /// Reads many keys, one concurrent task per shard.
    ///
    /// Shard results are merged in shard order once every task finished.
    /// Keys missing from the result were not found or belong to a failed
    /// shard; failed shards are listed in [`MultiGetOutcome::shard_errors`].
    ///
    /// # Errors
    ///
    /// Returns the first shard error if every non-empty shard failed.
    #[tracing::instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn get_multi(&self, keys: &[String]) -> QuorumResult<MultiGetOutcome> {
        self.timed(Operation::GetMulti, self.fan_out(keys)).await
    }

    async fn fan_out(&self, keys: &[String]) -> QuorumResult<MultiGetOutcome> {
        let mut tasks = JoinSet::new();
        let mut shard_of_task = HashMap::new();
        for (idx, shard) in self.ranking.split_by_shard(keys).into_iter().enumerate() {
            if shard.is_empty() {
                continue;
            }
            let client = self.clone();
            let handle = tasks.spawn(client.get_shard(idx, shard).in_current_span());
            shard_of_task.insert(handle.id(), idx);
        }

        let mut reads = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => reads.push((shard_of_task.get(&id).copied(), result)),
                Err(err) => {
                    warn!(error = %err, "shard task failed");
                    let result = Err(QuorumError::ShardTask { message: err.to_string() });
                    reads.push((shard_of_task.get(&err.id()).copied(), result));
                },
            }
        }
        reads.sort_by_key(|(idx, _)| *idx);

        let shards = reads.len();
        let mut outcome = MultiGetOutcome::default();
        for (_, result) in reads {
            match result {
                Ok(read) => {
                    outcome.items.extend(read.items);
                    outcome.targets.extend(read.targets);
                },
                Err(err) => {
                    self.metrics.record_shard_failure();
                    outcome.shard_errors.push(err);
                },
            }
        }

        if shards > 0 && outcome.shard_errors.len() == shards {
            return Err(outcome.shard_errors.remove(0));
        }
        Ok(outcome)
    }

    /// Reads the keys of one shard, walking the candidates of its first key.
    #[tracing::instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn get_shard(self, shard: usize, keys: Vec<String>) -> QuorumResult<ShardRead> {
        let mut wanted = HashSet::with_capacity(keys.len());
        let mut pending: Vec<String> = keys.into_iter().filter(|k| wanted.insert(k.clone())).collect();
        let Some(routing) = pending.first().cloned() else {
            return Ok(ShardRead::default());
        };

        let candidates = self.ranking.ranked_backends(&routing);
        let (n, r) = (self.config.n(), self.config.r());
        let mut read = ShardRead::default();
        let mut successes = 0;
        let mut errors = 0;
        let mut last_error = None;

        for (i, backend) in candidates.iter().enumerate() {
            let started = Instant::now();
            match backend.get_multi(&pending).await {
                Err(err) => {
                    debug!(backend = backend.addr(), key = %routing, error = %err, "backend multi-read failed");
                    errors += 1;
                    self.penalize(Penalty::FAULT, backend, &routing);
                    last_error = Some(err);
                },
                Ok(found) => {
                    successes += 1;
                    read.targets.push(backend.addr().to_owned());
                    for (key, item) in found {
                        if wanted.contains(&key) {
                            read.items.entry(key).or_insert(item);
                        }
                    }
                },
            }
            self.penalize(Penalty::latency(started.elapsed()), backend, &routing);

            if read.items.len() == wanted.len() {
                break;
            }
            if i + 1 >= n && successes >= r {
                last_error = None;
                read.targets.clear();
                break;
            }
            pending.retain(|k| !read.items.contains_key(k));
            if pending.is_empty() {
                break;
            }
        }

        self.metrics.record_backend_errors(errors);
        if !read.items.is_empty() {
            last_error = None;
        }
        match last_error {
            Some(source) => Err(QuorumError::ShardUnavailable { first_key: routing, source }),
            None => Ok(read),
        }
    }

    /// Stores `item` on at least W backends.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::ReadOnly`] in read-only mode and
    /// [`QuorumError::WriteQuorumNotMet`] if fewer than W backends acknowledged.
    #[tracing::instrument(skip(self, item), fields(len = item.len()))]
    pub async fn set(&self, key: &str, item: &Item, noreply: bool) -> QuorumResult<WriteOutcome> {
        let write = self.replicate(key, "set", |b| async move { b.set(key, item, noreply).await });
        self.timed(Operation::Set, write).await
    }

    /// Appends `value` to the existing item on at least W backends.
    ///
    /// Backends that don't hold the key do not acknowledge.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    #[tracing::instrument(skip(self, value), fields(len = value.len()))]
    pub async fn append(&self, key: &str, value: &[u8]) -> QuorumResult<WriteOutcome> {
        let write = self.replicate(key, "append", |b| async move { b.append(key, value).await });
        self.timed(Operation::Append, write).await
    }

    async fn replicate<F, Fut>(
        &self,
        key: &str,
        operation: &'static str,
        call: F,
    ) -> QuorumResult<WriteOutcome>
    where
        F: FnMut(BackendRef) -> Fut,
        Fut: Future<Output = BackendResult<bool>>,
    {
        self.ensure_writable(operation)?;
        let w = self.config.w();
        let policy = WalkPolicy {
            stop: StopRule::Quorum { attempts: self.config.n(), successes: w },
            on_error: Some(Penalty::WRITE_FAILURE),
            on_rejected: Some(Penalty::WRITE_FAILURE),
        };

        let candidates = self.ranking.ranked_backends(key);
        let tally = quorum_walk(
            self.ranking.as_ref(),
            key,
            &candidates,
            policy,
            call,
            |ok: &bool| *ok,
            |_: &bool| {},
        )
        .await;
        self.metrics.record_backend_errors(tally.errors);

        if tally.successes >= w {
            Ok(WriteOutcome { targets: tally.targets })
        } else {
            Err(QuorumError::WriteQuorumNotMet {
                key: key.to_owned(),
                acknowledged: tally.successes,
                required: w,
                targets: tally.targets,
            })
        }
    }

    /// Increments a counter, returning the highest value any backend reported.
    ///
    /// Only positive answers count toward W. The call succeeds whenever some
    /// backend reported a positive value, even below W.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::ReadOnly`] in read-only mode and
    /// [`QuorumError::CounterUnavailable`] if no backend reported a positive
    /// value and at least one failed. If none failed the outcome is `Ok` with
    /// value 0.
    #[tracing::instrument(skip(self))]
    pub async fn incr(&self, key: &str, delta: u64) -> QuorumResult<CounterOutcome> {
        self.timed(Operation::Incr, self.increment(key, delta)).await
    }

    async fn increment(&self, key: &str, delta: u64) -> QuorumResult<CounterOutcome> {
        self.ensure_writable("incr")?;
        let policy = WalkPolicy {
            stop: StopRule::Quorum { attempts: self.config.n(), successes: self.config.w() },
            on_error: Some(Penalty::FAULT),
            on_rejected: None,
        };

        let candidates = self.ranking.ranked_backends(key);
        let mut highest = 0;
        let tally = quorum_walk(
            self.ranking.as_ref(),
            key,
            &candidates,
            policy,
            |b| async move { b.incr(key, delta).await },
            |value: &u64| *value > 0,
            |value: &u64| highest = highest.max(*value),
        )
        .await;
        self.metrics.record_backend_errors(tally.errors);

        match tally.last_error {
            Some(source) if highest == 0 => {
                Err(QuorumError::CounterUnavailable { key: key.to_owned(), source })
            },
            _ => Ok(CounterOutcome { value: highest, targets: tally.targets }),
        }
    }

    /// Deletes a key from the first N candidates.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::ReadOnly`] in read-only mode and
    /// [`QuorumError::DeleteFailed`] if no backend confirmed the deletion and
    /// two or more failed.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> QuorumResult<DeleteOutcome> {
        self.timed(Operation::Delete, self.remove(key)).await
    }

    async fn remove(&self, key: &str) -> QuorumResult<DeleteOutcome> {
        self.ensure_writable("delete")?;
        let policy = WalkPolicy {
            stop: StopRule::Attempts(self.config.n()),
            on_error: Some(Penalty::FAULT),
            on_rejected: None,
        };

        let candidates = self.ranking.ranked_backends(key);
        let tally = quorum_walk(
            self.ranking.as_ref(),
            key,
            &candidates,
            policy,
            |b| async move { b.delete(key).await },
            |ok: &bool| *ok,
            |_: &bool| {},
        )
        .await;
        self.metrics.record_backend_errors(tally.errors);

        if tally.successes > 0 || tally.errors < DELETE_ERROR_TOLERANCE {
            Ok(DeleteOutcome {
                targets: tally.targets,
                confirmed: tally.successes,
                errors: tally.errors,
            })
        } else {
            Err(QuorumError::DeleteFailed {
                key: key.to_owned(),
                errors: tally.errors,
                last_error: tally.last_error,
            })
        }
    }

    fn ensure_writable(&self, operation: &'static str) -> QuorumResult<()> {
        if self.config.readonly() {
            return Err(QuorumError::ReadOnly { operation });
        }
        Ok(())
    }

    fn penalize(&self, penalty: Penalty, backend: &BackendRef, key: &str) {
        penalty.send(self.ranking.as_ref(), backend.as_ref(), key);
    }

    async fn timed<T>(
        &self,
        op: Operation,
        call: impl Future<Output = QuorumResult<T>>,
    ) -> QuorumResult<T> {
        let start = Instant::now();
        let result = call.await;
        self.finish(op, start.elapsed(), &result);
        result
    }

    fn finish<T>(&self, op: Operation, elapsed: Duration, result: &QuorumResult<T>) {
        self.metrics.record(op, elapsed);

        if let Err(err) = result {
            if matches!(err, QuorumError::ReadOnly { .. }) {
                debug!(operation = %op, error = %err, "write rejected");
            } else {
                if err.is_quorum_failure() {
                    self.metrics.record_quorum_failure();
                }
                warn!(operation = %op, error = %err, "quorum operation failed");
            }
        }

        if self.config.slow_threshold().is_some_and(|threshold| elapsed >= threshold) {
            warn!(operation = %op, elapsed_ms = elapsed.as_millis() as u64, "slow quorum operation");
        }
    }
}

impl MetricsCollector for QuorumClient {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl fmt::Debug for QuorumClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuorumClient").field("config", &self.config).finish_non_exhaustive()
    }
}

/// What one shard task resolved.
#[derive(Debug, Default)]
struct ShardRead {
    items: HashMap<String, Item>,
    targets: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testutil::{FixedRanking, ScriptedBackend, backend_refs};

    fn client(ranking: FixedRanking, n: usize, w: usize, r: usize) -> (QuorumClient, Arc<FixedRanking>) {
        let ranking = Arc::new(ranking);
        let config = QuorumConfig::builder().n(n).w(w).r(r).build().unwrap();
        (QuorumClient::new(Arc::clone(&ranking) as Arc<dyn RankingProvider>, config), ranking)
    }

    #[tokio::test]
    async fn test_get_hit_penalizes_skipped_backends() {
        let backends =
            [ScriptedBackend::healthy("a"), ScriptedBackend::healthy("b"), ScriptedBackend::healthy("c")];
        backends[1].seed("k", Item::new("v"));
        let (client, ranking) = client(FixedRanking::new(backend_refs(&backends)), 3, 2, 1);

        let lookup = client.get("k").await.unwrap();
        assert_eq!(lookup.item, Some(Item::new("v")));
        assert_eq!(lookup.targets, vec!["b"]);
        assert_eq!(backends[2].calls(), 0);

        let skipped: Vec<_> = ranking.feedback_for("a").into_iter().map(|e| e.delta).collect();
        assert!(skipped.contains(&-1.0), "a should be penalized as skipped: {skipped:?}");
        assert_eq!(client.metrics().snapshot().hits, 1);
    }

    #[tokio::test]
    async fn test_get_waits_for_n_before_confirming_miss() {
        let backends =
            [ScriptedBackend::healthy("a"), ScriptedBackend::healthy("b"), ScriptedBackend::healthy("c")];
        let (client, _) = client(FixedRanking::new(backend_refs(&backends)), 2, 1, 1);

        let lookup = client.get("absent").await.unwrap();
        assert!(!lookup.is_hit());
        assert_eq!(lookup.targets, vec!["a", "b", "c"]);
        assert_eq!(backends[1].calls(), 1);
        assert_eq!(backends[2].calls(), 0);
        assert_eq!(client.metrics().snapshot().misses, 1);
    }

    #[tokio::test]
    async fn test_get_exhausted_is_explicit_error() {
        let backends = [ScriptedBackend::failing("a"), ScriptedBackend::healthy("b")];
        let (client, _) = client(FixedRanking::new(backend_refs(&backends)), 2, 1, 2);

        let err = client.get("k").await.unwrap_err();
        match err {
            QuorumError::ReadQuorumNotMet { attempted, responded, required, last_error, .. } => {
                assert_eq!((attempted, responded, required), (2, 1, 2));
                assert!(last_error.is_some());
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.metrics().snapshot().quorum_failures, 1);
    }

    #[tokio::test]
    async fn test_shard_read_ignores_unrequested_keys() {
        let a = ScriptedBackend::healthy("a");
        a.seed("x", Item::new("1"));
        a.inject_stray("stray", Item::new("?"));
        let (client, _) = client(FixedRanking::new(backend_refs(&[a])), 1, 1, 1);

        let read = client.clone().get_shard(0, vec!["x".into(), "x".into()]).await.unwrap();
        assert_eq!(read.items.len(), 1);
        assert!(read.items.contains_key("x"));
    }

    #[tokio::test]
    async fn test_readonly_rejects_writes_without_contacting_backends() {
        let a = ScriptedBackend::healthy("a");
        let ranking = Arc::new(FixedRanking::new(backend_refs(&[Arc::clone(&a)])));
        let config = QuorumConfig::builder().n(1).w(1).readonly(true).build().unwrap();
        let client = QuorumClient::new(ranking, config);

        assert!(matches!(
            client.set("k", &Item::new("v"), false).await,
            Err(QuorumError::ReadOnly { operation: "set" })
        ));
        assert!(matches!(client.append("k", b"v").await, Err(QuorumError::ReadOnly { .. })));
        assert!(matches!(client.incr("k", 1).await, Err(QuorumError::ReadOnly { .. })));
        assert!(matches!(client.delete("k").await, Err(QuorumError::ReadOnly { .. })));
        assert_eq!(a.calls(), 0);
        assert_eq!(client.metrics().snapshot().quorum_failures, 0);
        assert!(client.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_operation_still_succeeds() {
        let a = ScriptedBackend::healthy("a");
        a.set_delay(Duration::from_millis(5));
        let ranking = Arc::new(FixedRanking::new(backend_refs(&[Arc::clone(&a)])));
        let config = QuorumConfig::builder()
            .n(1)
            .w(1)
            .slow_threshold(Duration::from_millis(1))
            .build()
            .unwrap();
        let client = QuorumClient::new(ranking, config);

        assert!(client.set("k", &Item::new("v"), false).await.is_ok());
        assert_eq!(client.metrics().snapshot().set.count, 1);
    }
}
