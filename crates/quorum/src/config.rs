//! Quorum client configuration.
//!
//! [`QuorumConfig`] carries the N/W/R quorum parameters plus the proxy-level
//! switches that shape how the client behaves (read-only mode, slow
//! operation logging). A config is immutable once built and is validated
//! both when built through [`QuorumConfig::builder`] and when deserialized.
//!
//! # Quorum Parameters
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | `n` | Minimum number of backends attempted per operation |
//! | `w` | Minimum write acknowledgements for a successful write |
//! | `r` | Minimum error-free read responses to confirm a miss |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of backends attempted per operation.
pub const DEFAULT_N: usize = 3;

/// Default write quorum.
pub const DEFAULT_W: usize = 2;

/// Default read quorum.
pub const DEFAULT_R: usize = 1;

/// Configuration for [`QuorumClient`](crate::QuorumClient).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cacheproxy_quorum::QuorumConfig;
///
/// let config = QuorumConfig::builder()
///     .n(3)
///     .w(2)
///     .r(2)
///     .slow_threshold(Duration::from_millis(200))
///     .build()?;
/// assert_eq!(config.w(), 2);
///
/// // W may not exceed N.
/// assert!(QuorumConfig::builder().n(2).w(3).build().is_err());
/// # Ok::<(), cacheproxy_quorum::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuorumConfig")]
pub struct QuorumConfig {
    n: usize,
    w: usize,
    r: usize,
    #[serde(with = "humantime_serde")]
    slow_threshold: Option<Duration>,
    readonly: bool,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self { n: DEFAULT_N, w: DEFAULT_W, r: DEFAULT_R, slow_threshold: None, readonly: false }
    }
}

#[bon::bon]
impl QuorumConfig {
    /// Creates a new configuration, validating the quorum parameters.
    ///
    /// # Optional Fields
    ///
    /// * `n` - Backends attempted per operation (default: 3).
    /// * `w` - Write quorum (default: 2).
    /// * `r` - Read quorum (default: 1).
    /// * `slow_threshold` - Operations at least this slow are logged (default: off).
    /// * `readonly` - Reject all writes (default: false).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `n`, `w` or `r` is zero
    /// - `w` or `r` exceeds `n`
    /// - `slow_threshold` is zero
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_N)] n: usize,
        #[builder(default = DEFAULT_W)] w: usize,
        #[builder(default = DEFAULT_R)] r: usize,
        slow_threshold: Option<Duration>,
        #[builder(default)] readonly: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self { n, w, r, slow_threshold, readonly };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants `1 <= w <= n` and `1 <= r <= n`.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("n", self.n), ("w", self.w), ("r", self.r)] {
            if value == 0 {
                return Err(ConfigError::BelowMinimum {
                    field,
                    min: "1".into(),
                    value: "0".into(),
                });
            }
        }
        for (field, value) in [("w", self.w), ("r", self.r)] {
            if value > self.n {
                return Err(ConfigError::ExceedsBound {
                    field,
                    bound: "n",
                    max: self.n.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if self.slow_threshold.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::MustBePositive { field: "slow_threshold", value: "0s".into() });
        }
        Ok(())
    }

    /// Returns N, the minimum number of backends attempted.
    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Returns W, the write quorum.
    #[must_use]
    pub fn w(&self) -> usize {
        self.w
    }

    /// Returns R, the read quorum.
    #[must_use]
    pub fn r(&self) -> usize {
        self.r
    }

    /// Returns the slow operation threshold, if enabled.
    #[must_use]
    pub fn slow_threshold(&self) -> Option<Duration> {
        self.slow_threshold
    }

    /// Returns whether writes are rejected.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.readonly
    }
}

/// Unvalidated wire form of [`QuorumConfig`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQuorumConfig {
    #[serde(default = "default_n")]
    n: usize,
    #[serde(default = "default_w")]
    w: usize,
    #[serde(default = "default_r")]
    r: usize,
    #[serde(with = "humantime_serde", default)]
    slow_threshold: Option<Duration>,
    #[serde(default)]
    readonly: bool,
}

fn default_n() -> usize {
    DEFAULT_N
}

fn default_w() -> usize {
    DEFAULT_W
}

fn default_r() -> usize {
    DEFAULT_R
}

impl TryFrom<RawQuorumConfig> for QuorumConfig {
    type Error = ConfigError;

    fn try_from(raw: RawQuorumConfig) -> Result<Self, Self::Error> {
        Self::builder()
            .n(raw.n)
            .w(raw.w)
            .r(raw.r)
            .maybe_slow_threshold(raw.slow_threshold)
            .readonly(raw.readonly)
            .build()
    }
}
