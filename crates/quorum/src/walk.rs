//! The quorum walk shared by the write paths.
//!
//! `set`, `append`, `incr` and `delete` all walk the ranked candidates in
//! order, issue one call per backend, count acknowledgements and stop once a
//! stop rule holds. They differ only in the call, what counts as an
//! acknowledgement, which feedback failures earn, and the stop rule. Those
//! differences are captured by [`WalkPolicy`] and the closures passed to
//! [`quorum_walk`].

use std::{future::Future, sync::Arc};

use tracing::debug;

use crate::{
    backend::BackendRef,
    error::{BackendError, BackendResult},
    feedback::Penalty,
    ranking::RankingProvider,
};

/// When a walk may stop contacting further candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRule {
    /// At least `attempts` candidates tried and `successes` acknowledged.
    Quorum { attempts: usize, successes: usize },
    /// At least `attempts` candidates tried, regardless of outcome.
    Attempts(usize),
}

impl StopRule {
    fn satisfied(self, tally: &Tally) -> bool {
        match self {
            Self::Quorum { attempts, successes } => {
                tally.successes >= successes && tally.attempts >= attempts
            },
            Self::Attempts(attempts) => tally.attempts >= attempts,
        }
    }
}

/// Per-operation walk behavior.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WalkPolicy {
    pub stop: StopRule,
    /// Feedback for a backend that failed with a transport error.
    pub on_error: Option<Penalty>,
    /// Feedback for a backend that answered but did not acknowledge.
    pub on_rejected: Option<Penalty>,
}

/// What a walk observed.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub attempts: usize,
    pub successes: usize,
    pub errors: usize,
    /// Addresses of acknowledging backends, in rank order.
    pub targets: Vec<String>,
    pub last_error: Option<BackendError>,
}

/// Walks `candidates` in rank order until `policy.stop` holds or the list
/// runs out.
///
/// `call` issues the operation against one backend. Every successful answer
/// is passed to `observe`; answers for which `acknowledged` returns `true`
/// count toward the quorum and record the backend as a target.
pub(crate) async fn quorum_walk<T, F, Fut, P, O>(
    ranking: &dyn RankingProvider,
    key: &str,
    candidates: &[BackendRef],
    policy: WalkPolicy,
    mut call: F,
    acknowledged: P,
    mut observe: O,
) -> Tally
where
    F: FnMut(BackendRef) -> Fut,
    Fut: Future<Output = BackendResult<T>>,
    P: Fn(&T) -> bool,
    O: FnMut(&T),
{
    let mut tally = Tally::default();

    for backend in candidates {
        tally.attempts += 1;
        match call(Arc::clone(backend)).await {
            Ok(answer) => {
                observe(&answer);
                if acknowledged(&answer) {
                    tally.successes += 1;
                    tally.targets.push(backend.addr().to_owned());
                } else if let Some(penalty) = policy.on_rejected {
                    penalty.send(ranking, backend.as_ref(), key);
                }
            },
            Err(err) => {
                debug!(backend = backend.addr(), key, error = %err, "backend call failed");
                tally.errors += 1;
                if let Some(penalty) = policy.on_error {
                    penalty.send(ranking, backend.as_ref(), key);
                }
                tally.last_error = Some(err);
            },
        }

        if policy.stop.satisfied(&tally) {
            break;
        }
    }

    tally
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testutil::{FixedRanking, ScriptedBackend, backend_refs};

    fn policy(stop: StopRule) -> WalkPolicy {
        WalkPolicy { stop, on_error: Some(Penalty::FAULT), on_rejected: Some(Penalty::WRITE_FAILURE) }
    }

    #[test]
    fn test_quorum_rule_needs_both_floors() {
        let rule = StopRule::Quorum { attempts: 3, successes: 2 };
        let mut tally = Tally { attempts: 2, successes: 2, ..Tally::default() };
        assert!(!rule.satisfied(&tally));
        tally.attempts = 3;
        assert!(rule.satisfied(&tally));
        tally.successes = 1;
        assert!(!rule.satisfied(&tally));
    }

    #[test]
    fn test_attempts_rule_ignores_successes() {
        let rule = StopRule::Attempts(2);
        assert!(!rule.satisfied(&Tally { attempts: 1, successes: 5, ..Tally::default() }));
        assert!(rule.satisfied(&Tally { attempts: 2, ..Tally::default() }));
    }

    #[tokio::test]
    async fn test_walk_stops_at_quorum() {
        let backends = [
            ScriptedBackend::healthy("a"),
            ScriptedBackend::healthy("b"),
            ScriptedBackend::healthy("c"),
        ];
        let ranking = FixedRanking::new(backend_refs(&backends));
        let candidates = ranking.ranked_backends("k");

        let tally = quorum_walk(
            &ranking,
            "k",
            &candidates,
            policy(StopRule::Quorum { attempts: 2, successes: 2 }),
            |b| async move { b.delete("k").await.map(|_| true) },
            |ok: &bool| *ok,
            |_: &bool| {},
        )
        .await;

        assert_eq!(tally.attempts, 2);
        assert_eq!(tally.successes, 2);
        assert_eq!(tally.targets, vec!["a", "b"]);
        assert_eq!(backends[2].calls(), 0);
        assert!(ranking.feedback_events().is_empty());
    }

    #[tokio::test]
    async fn test_walk_penalizes_errors_and_rejections() {
        let backends = [
            ScriptedBackend::failing("a"),
            ScriptedBackend::rejecting("b"),
            ScriptedBackend::healthy("c"),
        ];
        let ranking = FixedRanking::new(backend_refs(&backends));
        let candidates = ranking.ranked_backends("k");

        let mut answers = 0;
        let tally = quorum_walk(
            &ranking,
            "k",
            &candidates,
            policy(StopRule::Attempts(3)),
            |b| async move { b.append("k", b"x").await },
            |ok: &bool| *ok,
            |_: &bool| answers += 1,
        )
        .await;

        assert_eq!(answers, 2);
        assert_eq!(tally.errors, 1);
        assert_eq!(tally.successes, 0, "append on a missing key is not acknowledged");
        assert!(tally.last_error.is_some());

        let events = ranking.feedback_events();
        assert_eq!(events.len(), 3);
        assert_eq!((events[0].addr.as_str(), events[0].delta, events[0].fault), ("a", -10.0, true));
        assert_eq!((events[1].addr.as_str(), events[1].delta, events[1].fault), ("b", -2.0, false));
        assert_eq!((events[2].addr.as_str(), events[2].delta, events[2].fault), ("c", -2.0, false));
    }

    #[tokio::test]
    async fn test_walk_over_empty_candidates() {
        let ranking = FixedRanking::new(Vec::new());
        let tally = quorum_walk(
            &ranking,
            "k",
            &[],
            policy(StopRule::Attempts(1)),
            |b: BackendRef| async move { b.incr("k", 1).await },
            |v: &u64| *v > 0,
            |_: &u64| {},
        )
        .await;
        assert_eq!(tally.attempts, 0);
        assert!(tally.targets.is_empty());
    }
}
