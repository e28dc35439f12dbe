//! Conformance test suite for [`Backend`] implementations.
//!
//! Each function checks one aspect of the contract the quorum client relies
//! on. In particular, "not there" must be an answer (`None`, `false`, `0`)
//! and never an error, because the client treats every error as a transport
//! fault and penalizes the backend for it.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! a fresh backend instance:
//!
//! ```no_run
//! use cacheproxy_quorum::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn get_missing_key_returns_none() {
//!     conformance::get_missing_key_returns_none(&MemoryBackend::new("m")).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Read | `get` / `get_multi` semantics |
//! | Write | `set` / `append` acknowledgement |
//! | Counter | `incr` arithmetic and missing keys |
//! | Delete | `delete` acknowledgement |
//! | Concurrent | Safety under parallel access |

use std::sync::Arc;

use crate::{backend::Backend, error::BackendError, types::Item};

// ============================================================================
// Read
// ============================================================================

/// `get` on a missing key returns `Ok(None)`.
pub async fn get_missing_key_returns_none<B: Backend>(backend: &B) {
    let result = backend.get("missing").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None);
}

/// `set` then `get` returns the stored item, metadata included.
pub async fn set_then_get_returns_item<B: Backend>(backend: &B) {
    let item = Item::new("v1").with_flags(3).with_exptime(60);
    assert!(backend.set("read:k1", &item, false).await.expect("set"), "set should acknowledge");
    let got = backend.get("read:k1").await.expect("get").expect("present");
    assert_eq!(got.body, item.body);
    assert_eq!(got.flags, 3);
}

/// `get_multi` returns exactly the present subset of the requested keys.
pub async fn get_multi_returns_present_subset<B: Backend>(backend: &B) {
    backend.set("multi:a", &Item::new("1"), false).await.expect("set a");
    backend.set("multi:c", &Item::new("3"), false).await.expect("set c");
    backend.set("multi:other", &Item::new("x"), false).await.expect("set other");

    let keys = ["multi:a", "multi:b", "multi:c"].map(String::from);
    let found = backend.get_multi(&keys).await.expect("get_multi");

    let mut found_keys: Vec<&str> = found.keys().map(String::as_str).collect();
    found_keys.sort_unstable();
    assert_eq!(found_keys, ["multi:a", "multi:c"]);
    assert_eq!(found.get("multi:c").map(|i| i.body.as_ref()), Some(b"3".as_slice()));
}

/// `get_multi` with no keys returns an empty map.
pub async fn get_multi_no_keys_returns_empty<B: Backend>(backend: &B) {
    let found = backend.get_multi(&[]).await.expect("get_multi");
    assert!(found.is_empty());
}

// ============================================================================
// Write
// ============================================================================

/// `set` on an existing key overwrites it.
pub async fn set_overwrites_existing<B: Backend>(backend: &B) {
    backend.set("write:k", &Item::new("original"), false).await.expect("set");
    backend.set("write:k", &Item::new("updated"), true).await.expect("overwrite");
    let got = backend.get("write:k").await.expect("get").expect("present");
    assert_eq!(got.body.as_ref(), b"updated");
}

/// `append` to a missing key answers `Ok(false)` and creates nothing.
pub async fn append_to_missing_key_is_not_acknowledged<B: Backend>(backend: &B) {
    let acked = backend.append("append:missing", b"tail").await.expect("append");
    assert!(!acked, "append to a missing key must not acknowledge");
    assert_eq!(backend.get("append:missing").await.expect("get"), None);
}

/// `append` concatenates onto the existing body.
pub async fn append_concatenates<B: Backend>(backend: &B) {
    backend.set("append:k", &Item::new("head"), false).await.expect("set");
    assert!(backend.append("append:k", b"-tail").await.expect("append"));
    let got = backend.get("append:k").await.expect("get").expect("present");
    assert_eq!(got.body.as_ref(), b"head-tail");
}

// ============================================================================
// Counter
// ============================================================================

/// `incr` on a missing key answers `Ok(0)`.
pub async fn incr_missing_key_returns_zero<B: Backend>(backend: &B) {
    assert_eq!(backend.incr("counter:missing", 5).await.expect("incr"), 0);
}

/// `incr` adds the delta and returns the new value.
pub async fn incr_adds_delta<B: Backend>(backend: &B) {
    backend.set("counter:k", &Item::new("10"), false).await.expect("set");
    assert_eq!(backend.incr("counter:k", 5).await.expect("incr"), 15);
    assert_eq!(backend.incr("counter:k", 1).await.expect("incr"), 16);
    let got = backend.get("counter:k").await.expect("get").expect("present");
    assert_eq!(got.body.as_ref(), b"16");
}

/// `incr` on a non-numeric value is a protocol error.
pub async fn incr_non_numeric_is_protocol_error<B: Backend>(backend: &B) {
    backend.set("counter:text", &Item::new("abc"), false).await.expect("set");
    let result = backend.incr("counter:text", 1).await;
    assert!(matches!(result, Err(BackendError::Protocol { .. })), "got: {result:?}");
}

// ============================================================================
// Delete
// ============================================================================

/// `delete` on a missing key answers `Ok(false)`.
pub async fn delete_missing_key_returns_false<B: Backend>(backend: &B) {
    assert!(!backend.delete("delete:missing").await.expect("delete"));
}

/// `delete` removes a key and a second delete is a no-op.
pub async fn delete_removes_key<B: Backend>(backend: &B) {
    backend.set("delete:k", &Item::new("v"), false).await.expect("set");
    assert!(backend.delete("delete:k").await.expect("delete"));
    assert!(!backend.delete("delete:k").await.expect("second delete"));
    assert_eq!(backend.get("delete:k").await.expect("get"), None);
}

// ============================================================================
// Concurrent
// ============================================================================

/// Concurrent sets to different keys all land.
///
/// Requires `B: 'static` so the backend can be shared across spawned tasks
/// via `Arc`.
pub async fn concurrent_sets_to_different_keys<B: Backend + 'static>(backend: Arc<B>) {
    let mut handles = Vec::new();
    for i in 0u32..50 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            let key = format!("conc:{i:04}");
            backend.set(&key, &Item::new(format!("val:{i}")), false).await.expect("concurrent set");
        }));
    }
    for handle in handles {
        handle.await.expect("task join");
    }

    let keys: Vec<String> = (0u32..50).map(|i| format!("conc:{i:04}")).collect();
    let found = backend.get_multi(&keys).await.expect("get_multi");
    assert_eq!(found.len(), keys.len(), "every concurrent set should be visible");
}

/// Concurrent increments of one counter lose no update.
pub async fn concurrent_incr_loses_no_update<B: Backend + 'static>(backend: Arc<B>) {
    backend.set("conc:counter", &Item::new("0"), false).await.expect("set");

    let mut handles = Vec::new();
    for _ in 0..50 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            backend.incr("conc:counter", 2).await.expect("concurrent incr")
        }));
    }
    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.expect("task join"));
    }

    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 50, "every increment should observe a distinct value");
    assert_eq!(seen.last().copied(), Some(100));
}

// ============================================================================
// Convenience runner
// ============================================================================

/// Run the full conformance suite against the given backend.
///
/// ```no_run
/// use std::sync::Arc;
/// use cacheproxy_quorum::{MemoryBackend, conformance};
///
/// #[tokio::test]
/// async fn memory_backend_conformance() {
///     conformance::run_all(Arc::new(MemoryBackend::new("m"))).await;
/// }
/// ```
pub async fn run_all<B: Backend + 'static>(backend: Arc<B>) {
    // Read
    get_missing_key_returns_none(backend.as_ref()).await;
    set_then_get_returns_item(backend.as_ref()).await;
    get_multi_returns_present_subset(backend.as_ref()).await;
    get_multi_no_keys_returns_empty(backend.as_ref()).await;

    // Write
    set_overwrites_existing(backend.as_ref()).await;
    append_to_missing_key_is_not_acknowledged(backend.as_ref()).await;
    append_concatenates(backend.as_ref()).await;

    // Counter
    incr_missing_key_returns_zero(backend.as_ref()).await;
    incr_adds_delta(backend.as_ref()).await;
    incr_non_numeric_is_protocol_error(backend.as_ref()).await;

    // Delete
    delete_missing_key_returns_false(backend.as_ref()).await;
    delete_removes_key(backend.as_ref()).await;

    // Concurrent
    concurrent_sets_to_different_keys(Arc::clone(&backend)).await;
    concurrent_incr_loses_no_update(Arc::clone(&backend)).await;
}
