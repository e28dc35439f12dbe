//! Error types and result aliases.
//!
//! Three layers of failure are distinguished:
//!
//! - [`BackendError`] - a single backend handle failed to answer (transport fault). These never
//!   cross the [`QuorumClient`](crate::QuorumClient) boundary on their own; the client absorbs them
//!   into ranking feedback and a continue/stop decision.
//! - [`QuorumError`] - the aggregate outcome of an operation could not satisfy its quorum rule.
//! - [`ConfigError`] - a configuration value failed validation.
//!
//! # Example
//!
//! ```
//! use cacheproxy_quorum::{BackendError, BackendResult};
//!
//! fn dial(addr: &str) -> BackendResult<()> {
//!     Err(BackendError::connection(format!("connection refused: {addr}")))
//! }
//!
//! assert!(dial("10.0.0.1:11211").is_err());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for operations against a single backend.
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias for quorum operations.
pub type QuorumResult<T> = Result<T, QuorumError>;

/// Errors a single backend handle can report.
///
/// Every variant counts as a transport fault from the quorum client's point
/// of view. A backend that answers but declines an operation (for example
/// `append` on a missing key) reports `Ok(false)` instead of an error.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// The backend could not be reached or the connection broke mid-request.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The backend answered with something the client could not interpret.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The backend did not answer in time.
    #[error("Operation timeout")]
    Timeout,

    /// Backend-specific failure that fits no other category.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl BackendError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }
}

/// Aggregate failures of a quorum operation.
///
/// Per-backend failures are absorbed while walking the ranked candidates;
/// only the final outcome is surfaced here. Partial successes (a batched
/// read that resolved some keys, a delete that tolerated one error) are
/// reported as `Ok`, not as one of these variants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuorumError {
    /// The candidate list ran out before a value was found or a miss could
    /// be confirmed by `required` error-free responses within `n` attempts.
    #[error(
        "Read quorum not met for key {key}: {responded}/{attempted} backends responded, {required} required"
    )]
    ReadQuorumNotMet {
        /// The key being read.
        key: String,
        /// Number of backends contacted.
        attempted: usize,
        /// Number of backends that answered without a transport error.
        responded: usize,
        /// The configured read quorum (R).
        required: usize,
        /// The last transport error observed, if any.
        #[source]
        last_error: Option<BackendError>,
    },

    /// Fewer than W backends acknowledged a write.
    #[error("Write failed for key {key}: {acknowledged} acknowledged, {required} required")]
    WriteQuorumNotMet {
        /// The key being written.
        key: String,
        /// Number of backends that acknowledged the write.
        acknowledged: usize,
        /// The configured write quorum (W).
        required: usize,
        /// Addresses of the backends that did acknowledge.
        targets: Vec<String>,
    },

    /// No backend produced a positive counter and at least one failed.
    #[error("Increment failed for key {key}")]
    CounterUnavailable {
        /// The counter key.
        key: String,
        /// The last transport error observed.
        #[source]
        source: BackendError,
    },

    /// No backend confirmed the deletion and two or more backends failed.
    #[error("Delete failed for key {key}: {errors} backend errors")]
    DeleteFailed {
        /// The key being deleted.
        key: String,
        /// Number of backend errors observed.
        errors: usize,
        /// The last transport error observed.
        #[source]
        last_error: Option<BackendError>,
    },

    /// A batched-read shard resolved no key and at least one backend failed.
    #[error("Shard unavailable for key {first_key}")]
    ShardUnavailable {
        /// The first key of the shard (its routing key).
        first_key: String,
        /// The last transport error observed for the shard.
        #[source]
        source: BackendError,
    },

    /// A shard task panicked or was cancelled before reporting.
    #[error("Shard task failed: {message}")]
    ShardTask {
        /// Description of the task failure.
        message: String,
    },

    /// A write operation was rejected because the client is read-only.
    #[error("Client is read-only, {operation} rejected")]
    ReadOnly {
        /// The rejected operation.
        operation: &'static str,
    },
}

impl QuorumError {
    /// Returns `true` if this error means too few backends agreed, as
    /// opposed to the client refusing or failing to run the operation.
    #[must_use]
    pub fn is_quorum_failure(&self) -> bool {
        matches!(
            self,
            Self::ReadQuorumNotMet { .. }
                | Self::WriteQuorumNotMet { .. }
                | Self::CounterUnavailable { .. }
                | Self::DeleteFailed { .. }
                | Self::ShardUnavailable { .. }
        )
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// The minimum allowed value.
        min: String,
        /// The value supplied.
        value: String,
    },

    /// A value exceeds the bound set by another field.
    #[error("{field} must not exceed {bound} ({max}), got {value}")]
    ExceedsBound {
        /// The offending field.
        field: &'static str,
        /// The field that bounds it.
        bound: &'static str,
        /// The bounding value.
        max: String,
        /// The value supplied.
        value: String,
    },

    /// A duration must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// The offending field.
        field: &'static str,
        /// The value supplied.
        value: String,
    },

    /// A collection that must not be empty was empty.
    #[error("{field} must not be empty")]
    Empty {
        /// The offending field.
        field: &'static str,
    },
}
