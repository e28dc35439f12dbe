//! In-memory backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-process implementation of
//! [`Backend`] suitable for testing, benchmarks and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Cache semantics**: `append` and `incr` only act on existing keys, like a memory-object store
//!
//! # Example
//!
//! ```
//! use cacheproxy_quorum::{Backend, Item, MemoryBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new("mem-1");
//!
//!     backend.set("hits", &Item::new("41"), false).await.unwrap();
//!     assert_eq!(backend.incr("hits", 1).await.unwrap(), 42);
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - `exptime` is stored but never enforced

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;

use crate::{
    backend::Backend,
    error::{BackendError, BackendResult},
    types::Item,
};

/// In-memory backend keyed by string.
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data and address.
#[derive(Clone)]
pub struct MemoryBackend {
    addr: Arc<str>,
    data: Arc<RwLock<HashMap<String, Item>>>,
}

impl MemoryBackend {
    /// Creates an empty backend identified by `addr`.
    pub fn new(addr: impl Into<Arc<str>>) -> Self {
        Self { addr: addr.into(), data: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Stores `item` under `key` without going through the async [`Backend`] API.
    pub fn insert(&self, key: impl Into<String>, item: Item) {
        self.data.write().insert(key.into(), item);
    }

    /// Returns a copy of the item stored under `key`.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Item> {
        self.data.read().get(key).cloned()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").field("addr", &self.addr).field("len", &self.len()).finish()
    }
}

/// Parses a stored body as an ASCII unsigned counter.
fn parse_counter(body: &[u8]) -> BackendResult<u64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| BackendError::protocol("cannot increment or decrement non-numeric value"))
}

#[async_trait]
impl Backend for MemoryBackend {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Item>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn get_multi(&self, keys: &[String]) -> BackendResult<HashMap<String, Item>> {
        let data = self.data.read();
        Ok(keys.iter().filter_map(|k| data.get(k).map(|item| (k.clone(), item.clone()))).collect())
    }

    async fn set(&self, key: &str, item: &Item, _noreply: bool) -> BackendResult<bool> {
        self.data.write().insert(key.to_owned(), item.clone());
        Ok(true)
    }

    async fn append(&self, key: &str, value: &[u8]) -> BackendResult<bool> {
        let mut data = self.data.write();
        let Some(item) = data.get_mut(key) else {
            return Ok(false);
        };

        let mut body = BytesMut::with_capacity(item.body.len() + value.len());
        body.extend_from_slice(&item.body);
        body.extend_from_slice(value);
        item.body = body.freeze();
        Ok(true)
    }

    async fn incr(&self, key: &str, delta: u64) -> BackendResult<u64> {
        let mut data = self.data.write();
        let Some(item) = data.get_mut(key) else {
            return Ok(0);
        };

        let value = parse_counter(&item.body)?.wrapping_add(delta);
        item.body = Bytes::from(value.to_string());
        Ok(value)
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }
}
