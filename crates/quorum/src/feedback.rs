//! Feedback penalties sent to the ranking provider.
//!
//! Every contacted backend produces a score adjustment. All adjustments are
//! penalties (negative); faster and more reliable backends simply lose less
//! score and drift to the front of future rankings.
//!
//! | Signal | Delta | Fault |
//! |--------|-------|-------|
//! | Transport fault | `-10` | yes |
//! | Write rejected or failed | `-2` | no |
//! | Ranked ahead of the serving backend on a read hit | `-1` | no |
//! | Answered a read after `t` seconds | `-sqrt(t) * t` | no |

use std::time::Duration;

use crate::{backend::Backend, ranking::RankingProvider};

/// Penalty for a transport fault.
pub const FAULT_PENALTY: f64 = -10.0;

/// Penalty for a write that failed or was not acknowledged.
pub const WRITE_FAILURE_PENALTY: f64 = -2.0;

/// Penalty for a backend ranked ahead of the one that served a read hit.
pub const SKIPPED_PENALTY: f64 = -1.0;

/// Latency penalty for a read answered after `elapsed`.
///
/// Grows super-linearly (`t^1.5`) so that slow backends are demoted faster
/// than their latency alone would suggest.
#[must_use]
pub fn latency_penalty(elapsed: Duration) -> f64 {
    let t = elapsed.as_secs_f64();
    -(t.sqrt() * t)
}

/// A single score adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penalty {
    /// Score delta (negative).
    pub delta: f64,
    /// Whether the adjustment stems from a transport fault.
    pub fault: bool,
}

impl Penalty {
    /// Transport fault.
    pub const FAULT: Self = Self { delta: FAULT_PENALTY, fault: true };

    /// Failed or unacknowledged write.
    pub const WRITE_FAILURE: Self = Self { delta: WRITE_FAILURE_PENALTY, fault: false };

    /// Backend skipped on the way to a read hit.
    pub const SKIPPED: Self = Self { delta: SKIPPED_PENALTY, fault: false };

    /// Latency-proportional penalty.
    #[must_use]
    pub fn latency(elapsed: Duration) -> Self {
        Self { delta: latency_penalty(elapsed), fault: false }
    }

    /// Reports this penalty for `backend` and `key`.
    pub(crate) fn send(self, ranking: &dyn RankingProvider, backend: &dyn Backend, key: &str) {
        ranking.feedback(backend, key, self.delta, self.fault);
    }
}
