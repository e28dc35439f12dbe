//! Shared test utilities for quorum client testing.
//!
//! This module provides scripted backends whose behavior tests control, a
//! ranking provider with a fixed order that records every feedback call, and
//! helpers for generating keys and items. It is feature-gated behind
//! `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! cacheproxy-quorum = { path = ".", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use cacheproxy_quorum::testutil::{FixedRanking, ScriptedBackend, backend_refs};
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    backend::{Backend, BackendRef},
    error::{BackendError, BackendResult},
    memory::MemoryBackend,
    ranking::{RankingProvider, Shards},
    types::Item,
};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"` (zero-padded to 6 digits).
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Create a test item whose body is `size` bytes of `0xAB`.
#[must_use]
pub fn make_item(size: usize) -> Item {
    Item::new(vec![0xAB; size])
}

/// Create a [`MemoryBackend`] at `addr` pre-populated with `count` keys.
///
/// Keys are formatted by [`make_key`] with items of `value_size` bytes.
#[must_use]
pub fn populated_backend(addr: &str, prefix: &str, count: usize, value_size: usize) -> MemoryBackend {
    let backend = MemoryBackend::new(addr);
    let item = make_item(value_size);
    for i in 0..count {
        backend.insert(make_key(prefix, i), item.clone());
    }
    backend
}

/// Converts concrete backend handles into the trait objects a ranking returns.
#[must_use]
pub fn backend_refs<B: Backend + 'static>(backends: &[Arc<B>]) -> Vec<BackendRef> {
    backends.iter().map(|b| Arc::clone(b) as BackendRef).collect()
}

/// How a [`ScriptedBackend`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Delegates to an in-memory store.
    Healthy,
    /// Fails every call with a connection error.
    Failing,
    /// Answers every call without acknowledging: `None`, `false`, `0` or an empty map.
    Rejecting,
    /// Panics on `get_multi`, otherwise healthy.
    PanicOnMultiGet,
}

/// A backend whose answers are scripted by the test.
///
/// Counts every call and can inject latency, stray keys in `get_multi`
/// responses, and behavior changes at runtime.
pub struct ScriptedBackend {
    store: MemoryBackend,
    behavior: Mutex<Behavior>,
    delay: Mutex<Duration>,
    stray: Mutex<HashMap<String, Item>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    /// Creates a backend at `addr` with the given behavior.
    #[must_use]
    pub fn new(addr: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            store: MemoryBackend::new(addr),
            behavior: Mutex::new(behavior),
            delay: Mutex::new(Duration::ZERO),
            stray: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Creates a backend that answers from its own in-memory store.
    #[must_use]
    pub fn healthy(addr: &str) -> Arc<Self> {
        Self::new(addr, Behavior::Healthy)
    }

    /// Creates a backend that fails every call.
    #[must_use]
    pub fn failing(addr: &str) -> Arc<Self> {
        Self::new(addr, Behavior::Failing)
    }

    /// Creates a backend that answers but never acknowledges.
    #[must_use]
    pub fn rejecting(addr: &str) -> Arc<Self> {
        Self::new(addr, Behavior::Rejecting)
    }

    /// Seeds the in-memory store.
    pub fn seed(&self, key: &str, item: Item) {
        self.store.insert(key, item);
    }

    /// Returns what the in-memory store holds for `key`.
    #[must_use]
    pub fn stored(&self, key: &str) -> Option<Item> {
        self.store.peek(key)
    }

    /// Adds a key that every `get_multi` answer will carry, requested or not.
    pub fn inject_stray(&self, key: &str, item: Item) {
        self.stray.lock().insert(key.to_owned(), item);
    }

    /// Sleeps this long before answering each call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Switches the behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Behavior {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        *self.behavior.lock()
    }

    fn refused(&self) -> BackendError {
        BackendError::connection(format!("{} refused connection", self.store.addr()))
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn addr(&self) -> &str {
        self.store.addr()
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Item>> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(None),
            Behavior::Healthy | Behavior::PanicOnMultiGet => self.store.get(key).await,
        }
    }

    #[allow(clippy::panic)]
    async fn get_multi(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(HashMap::new()),
            Behavior::PanicOnMultiGet => panic!("{} crashed serving get_multi", self.addr()),
            Behavior::Healthy => {
                let mut found = self.store.get_multi(keys).await?;
                found.extend(self.stray.lock().iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(found)
            },
        }
    }

    async fn set(&self, key: &str, item: &Item, noreply: bool) -> BackendResult<bool> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(false),
            Behavior::Healthy | Behavior::PanicOnMultiGet => self.store.set(key, item, noreply).await,
        }
    }

    async fn append(&self, key: &str, value: &[u8]) -> BackendResult<bool> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(false),
            Behavior::Healthy | Behavior::PanicOnMultiGet => self.store.append(key, value).await,
        }
    }

    async fn incr(&self, key: &str, delta: u64) -> BackendResult<u64> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(0),
            Behavior::Healthy | Behavior::PanicOnMultiGet => self.store.incr(key, delta).await,
        }
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        match self.enter().await {
            Behavior::Failing => Err(self.refused()),
            Behavior::Rejecting => Ok(false),
            Behavior::Healthy | Behavior::PanicOnMultiGet => self.store.delete(key).await,
        }
    }
}

/// One recorded [`RankingProvider::feedback`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackEvent {
    /// Address of the scored backend.
    pub addr: String,
    /// Routing key the feedback was sent for.
    pub key: String,
    /// Score delta.
    pub delta: f64,
    /// Whether the feedback was a fault.
    pub fault: bool,
}

type ShardFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// A ranking provider that always returns the same candidate order and
/// records every feedback call.
///
/// By default all keys fall into a single shard.
pub struct FixedRanking {
    backends: Vec<BackendRef>,
    shard_count: usize,
    shard_of: ShardFn,
    events: Mutex<Vec<FeedbackEvent>>,
}

impl FixedRanking {
    /// Creates a ranking returning `backends` in this order for every key.
    #[must_use]
    pub fn new(backends: Vec<BackendRef>) -> Self {
        Self { backends, shard_count: 1, shard_of: Arc::new(|_| 0), events: Mutex::new(Vec::new()) }
    }

    /// Splits keys into `count` shards using `shard_of`, which must return an
    /// index below `count`.
    #[must_use]
    pub fn with_shards(
        mut self,
        count: usize,
        shard_of: impl Fn(&str) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.shard_count = count;
        self.shard_of = Arc::new(shard_of);
        self
    }

    /// Returns every feedback call received so far, in order.
    #[must_use]
    pub fn feedback_events(&self) -> Vec<FeedbackEvent> {
        self.events.lock().clone()
    }

    /// Returns the feedback calls received for `addr`.
    #[must_use]
    pub fn feedback_for(&self, addr: &str) -> Vec<FeedbackEvent> {
        self.events.lock().iter().filter(|e| e.addr == addr).cloned().collect()
    }
}

impl RankingProvider for FixedRanking {
    fn ranked_backends(&self, _key: &str) -> Vec<BackendRef> {
        self.backends.clone()
    }

    fn feedback(&self, backend: &dyn Backend, key: &str, delta: f64, fault: bool) {
        self.events.lock().push(FeedbackEvent {
            addr: backend.addr().to_owned(),
            key: key.to_owned(),
            delta,
            fault,
        });
    }

    fn split_by_shard(&self, keys: &[String]) -> Shards {
        let mut shards = vec![Vec::new(); self.shard_count];
        for key in keys {
            let idx = (self.shard_of)(key).min(self.shard_count.saturating_sub(1));
            if let Some(shard) = shards.get_mut(idx) {
                shard.push(key.clone());
            }
        }
        shards
    }
}

/// Assert that a quorum result is `Ok`, returning the inner value.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use cacheproxy_quorum::{QuorumResult, assert_quorum_ok};
///
/// let result: QuorumResult<i32> = Ok(42);
/// assert_eq!(assert_quorum_ok!(result), 42);
/// ```
#[macro_export]
macro_rules! assert_quorum_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got QuorumError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got QuorumError: {e:?}", $msg),
        }
    };
}

/// Assert that a quorum result is an error matching `pattern`.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use cacheproxy_quorum::{QuorumError, QuorumResult, assert_quorum_error};
///
/// let result: QuorumResult<()> = Err(QuorumError::ReadOnly { operation: "set" });
/// assert_quorum_error!(result, QuorumError::ReadOnly { .. });
/// ```
#[macro_export]
macro_rules! assert_quorum_error {
    ($result:expr, $pattern:pat) => {
        match &$result {
            Err(e) if matches!(e, $pattern) => {},
            other => panic!("expected {}, got: {:?}", stringify!($pattern), other),
        }
    };
}
