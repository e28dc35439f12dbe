//! Quorum client engine for a distributed caching proxy.
//!
//! This crate decides, for every key operation, which cache backends to
//! contact, in what order, how many answers make an operation succeed, and
//! how observed latency and errors feed back into future routing. It
//! implements Dynamo-style N/W/R quorum semantics over a pool of independent
//! backends that know nothing about each other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Proxy front-end                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     QuorumClient                            │
//! │   get │ get_multi │ set │ append │ incr │ delete            │
//! │        (N/W/R walk, feedback, shard fan-out)                │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       RankingProvider        │          Backend             │
//! │ (ranked candidates, scores,  │  (one cache instance,        │
//! │  shard split)                │   raw per-key operations)    │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use cacheproxy_quorum::{
//!     BackendRef, Item, MemoryBackend, QuorumClient, QuorumConfig, ScoredRanking,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backends: Vec<BackendRef> = ["10.0.0.1:11211", "10.0.0.2:11211", "10.0.0.3:11211"]
//!         .into_iter()
//!         .map(|addr| Arc::new(MemoryBackend::new(addr)) as BackendRef)
//!         .collect();
//!     let ranking = Arc::new(ScoredRanking::new(backends, 64)?);
//!     let config = QuorumConfig::builder().n(3).w(2).r(1).build()?;
//!     let client = QuorumClient::new(ranking, config);
//!
//!     client.set("user:123", &Item::new("Alice"), false).await?;
//!     let lookup = client.get("user:123").await?;
//!     assert!(lookup.is_hit());
//!
//!     let keys = vec!["user:123".to_string(), "user:456".to_string()];
//!     let batch = client.get_multi(&keys).await?;
//!     assert_eq!(batch.items.len(), 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! | Operation | Stops when | Succeeds when |
//! |-----------|------------|---------------|
//! | [`get`](QuorumClient::get) | value found, or N tried and R answered | value found or miss confirmed |
//! | [`get_multi`](QuorumClient::get_multi) | per shard: all keys found, or N tried and R answered | any shard succeeded |
//! | [`set`](QuorumClient::set) / [`append`](QuorumClient::append) | W acknowledged and N tried | W acknowledged |
//! | [`incr`](QuorumClient::incr) | W positive answers and N tried | some positive answer, or no errors |
//! | [`delete`](QuorumClient::delete) | N tried | one confirmation, or fewer than 2 errors |
//!
//! # Error Handling
//!
//! Backends return [`BackendResult<T>`]; every `Err` is treated as a
//! transport fault, absorbed by the client and turned into feedback. Only the
//! aggregate outcome of an operation crosses the client boundary, as
//! [`QuorumResult<T>`].
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (scripted backends, a recording ranking
//!   provider, key/item generators, assertion macros) and the backend `conformance` suite.
//!   Enable this in `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod backend;
pub mod client;
pub mod config;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod feedback;
pub mod memory;
pub mod metrics;
pub mod ranking;
pub mod scored;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;
mod walk;

// Re-export primary types at crate root for convenience
pub use backend::{Backend, BackendRef};
pub use client::QuorumClient;
pub use config::QuorumConfig;
pub use error::{BackendError, BackendResult, BoxError, ConfigError, QuorumError, QuorumResult};
pub use feedback::{Penalty, latency_penalty};
pub use memory::MemoryBackend;
pub use metrics::{
    LatencyPercentiles, Metrics, MetricsCollector, MetricsSnapshot, Operation, OperationSnapshot,
};
pub use ranking::{RankingProvider, Shards};
pub use scored::ScoredRanking;
pub use types::{CounterOutcome, DeleteOutcome, Item, Lookup, MultiGetOutcome, WriteOutcome};
