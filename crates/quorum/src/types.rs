//! Value container and per-operation outcome types.
//!
//! The quorum client never inspects or mutates an [`Item`]; it only routes
//! it to backends and hands results back by value.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One cached value and its backend-defined metadata.
///
/// # Examples
///
/// ```
/// use cacheproxy_quorum::Item;
///
/// let item = Item::new("hello").with_flags(7).with_exptime(300);
/// assert_eq!(item.body.as_ref(), b"hello");
/// assert_eq!(item.flags, 7);
/// assert_eq!(item.exptime, 300);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// The stored payload.
    pub body: Bytes,

    /// Opaque client flags stored alongside the payload.
    #[serde(default)]
    pub flags: u32,

    /// Expiration time as understood by the backend (0 = never).
    #[serde(default)]
    pub exptime: u32,

    /// Compare-and-swap token reported by the backend, if any.
    #[serde(default)]
    pub cas: u64,
}

impl Item {
    /// Creates an item with the given body and zeroed metadata.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), ..Self::default() }
    }

    /// Sets the client flags.
    #[must_use]
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the expiration time.
    #[must_use]
    pub fn with_exptime(mut self, exptime: u32) -> Self {
        self.exptime = exptime;
        self
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Outcome of a single-key read.
///
/// `item` is `None` for a confirmed miss. In that case `targets` holds a
/// fixed-size sample of the best-ranked candidates, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    /// The value, if any backend held it.
    pub item: Option<Item>,
    /// Backends that produced this outcome.
    pub targets: Vec<String>,
}

impl Lookup {
    /// Returns `true` if a value was found.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.item.is_some()
    }
}

/// Outcome of a batched read across all shards.
///
/// Keys absent from `items` were not found (or their shard failed); callers
/// must compare against the requested keys to detect gaps.
#[derive(Debug, Default)]
pub struct MultiGetOutcome {
    /// Resolved values, keyed by requested key.
    pub items: HashMap<String, Item>,
    /// Backends that served at least one shard.
    pub targets: Vec<String>,
    /// Errors of shards that resolved nothing, in shard order.
    pub shard_errors: Vec<crate::QuorumError>,
}

impl MultiGetOutcome {
    /// Returns the first shard error, if any shard failed.
    #[must_use]
    pub fn first_error(&self) -> Option<&crate::QuorumError> {
        self.shard_errors.first()
    }
}

/// Outcome of a successful `set` or `append`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Backends that acknowledged the write, in rank order.
    pub targets: Vec<String>,
}

/// Outcome of an `incr`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterOutcome {
    /// The highest counter value any backend reported (0 if none held the key).
    pub value: u64,
    /// Backends that reported a positive counter.
    pub targets: Vec<String>,
}

/// Outcome of a successful `delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Backends that confirmed the deletion.
    pub targets: Vec<String>,
    /// Number of backends that confirmed the deletion.
    pub confirmed: usize,
    /// Number of backends that failed with a transport error.
    pub errors: usize,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builder_methods() {
        let item = Item::new(b"abc".to_vec()).with_flags(2).with_exptime(60);
        assert_eq!(item.len(), 3);
        assert!(!item.is_empty());
        assert_eq!(item.flags, 2);
        assert_eq!(item.exptime, 60);
        assert_eq!(item.cas, 0);
    }

    #[test]
    fn test_item_deserializes_with_default_metadata() {
        let item: Item = serde_json::from_str(r#"{"body":[104,105]}"#).expect("deserialize");
        assert_eq!(item, Item::new("hi"));
    }

    #[test]
    fn test_lookup_hit() {
        assert!(!Lookup::default().is_hit());
        let lookup = Lookup { item: Some(Item::new("v")), targets: vec!["a".into()] };
        assert!(lookup.is_hit());
    }
}
