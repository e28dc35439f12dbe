//! Backend handle trait definition.
//!
//! A [`Backend`] is one connection/endpoint to a single cache instance,
//! identified by its address string. It performs raw per-key operations and
//! knows nothing about replication; the [`QuorumClient`](crate::QuorumClient)
//! decides which backends to contact and how many answers are enough.
//!
//! # Design
//!
//! - **Async by default**: every operation may block on network I/O.
//! - **Shared**: handles are held as [`BackendRef`] and may be used by many concurrent shard tasks
//!   at once, so implementations must be `Send + Sync`.
//! - **Errors are transport faults**: an `Err` means the backend could not answer. A backend that
//!   answers but declines (key missing, not stored) returns `Ok(false)` / `Ok(None)` / `Ok(0)`.
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{error::BackendResult, types::Item};

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;

/// A single cache backend instance.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](Backend::get) | Retrieve one value |
/// | [`get_multi`](Backend::get_multi) | Retrieve several values in one round trip |
/// | [`set`](Backend::set) | Store a value |
/// | [`append`](Backend::append) | Append bytes to an existing value |
/// | [`incr`](Backend::incr) | Increment a numeric value |
/// | [`delete`](Backend::delete) | Remove a value |
///
/// # Example
///
/// ```
/// use cacheproxy_quorum::{Backend, Item, MemoryBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new("127.0.0.1:11211");
///
/// assert!(backend.set("key", &Item::new("value"), false).await.unwrap());
/// let item = backend.get("key").await.unwrap();
/// assert_eq!(item.map(|i| i.body), Some("value".into()));
/// # });
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the address identifying this backend.
    fn addr(&self) -> &str;

    /// Retrieves a value by key.
    ///
    /// - `Ok(Some(item))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on transport errors
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> BackendResult<Option<Item>>;

    /// Retrieves several keys at once.
    ///
    /// The returned map holds only keys that exist; missing keys are simply
    /// absent from it.
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn get_multi(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>>;

    /// Stores a value, returning whether the backend acknowledged it.
    ///
    /// `noreply` asks the backend not to send a reply; implementations that
    /// honor it report `Ok(true)` once the request has been written.
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn set(&self, key: &str, item: &Item, noreply: bool) -> BackendResult<bool>;

    /// Appends bytes to an existing value.
    ///
    /// Returns `Ok(false)` if the key does not exist.
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn append(&self, key: &str, value: &[u8]) -> BackendResult<bool>;

    /// Increments a numeric value by `delta` and returns the new value.
    ///
    /// Returns `Ok(0)` if the key does not exist.
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn incr(&self, key: &str, delta: u64) -> BackendResult<u64>;

    /// Deletes a key, returning whether it existed.
    #[must_use = "backend operations may fail and errors must be handled"]
    async fn delete(&self, key: &str) -> BackendResult<bool>;
}
