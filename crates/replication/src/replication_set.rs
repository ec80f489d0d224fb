//! Replication sets and the quorum executor.
//!
//! A `ReplicationSet` is produced per request by a ring lookup and lives for
//! that request only. `do_until_quorum` runs a per-replica callback against
//! every member of the set concurrently and returns as soon as enough of them
//! succeeded, or as soon as the failure budget is exhausted.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use corelib::InstanceDesc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Why `do_until_quorum` gave up.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError<E> {
    /// Failures were spread over more zones than the zone budget allows.
    #[error("too many zones failed")]
    TooManyZoneFailures,

    /// The caller's token was cancelled before quorum was reached.
    #[error("operation canceled")]
    Canceled,

    /// The replica failure that exhausted the error budget.
    #[error("{0}")]
    Replica(E),
}

impl<E> QuorumError<E> {
    /// The replica error, if this failure was caused by one.
    pub fn replica(&self) -> Option<&E> {
        match self {
            QuorumError::Replica(e) => Some(e),
            _ => None,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            QuorumError::TooManyZoneFailures => "zone_failures",
            QuorumError::Canceled => "canceled",
            QuorumError::Replica(_) => "replica_errors",
        }
    }
}

/// The members to talk to for one key, and how many of them may fail.
///
/// `max_errors` and `max_unavailable_zones` are alternative budgets. When
/// `max_unavailable_zones` is non-zero it takes precedence and `max_errors`
/// is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationSet {
    pub instances: Vec<InstanceDesc>,
    pub max_errors: usize,
    pub max_unavailable_zones: usize,
}

impl ReplicationSet {
    pub fn new(instances: Vec<InstanceDesc>, max_errors: usize, max_unavailable_zones: usize) -> Self {
        Self {
            instances,
            max_errors,
            max_unavailable_zones,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Whether a member with address `addr` is part of the set.
    pub fn includes(&self, addr: &str) -> bool {
        self.instances.iter().any(|i| i.addr == addr)
    }

    /// Addresses of all members. Order is not guaranteed.
    pub fn addresses(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.addr.clone()).collect()
    }

    /// Distinct non-empty zones of the members.
    pub fn zones(&self) -> BTreeSet<&str> {
        self.instances
            .iter()
            .filter(|i| !i.zone.is_empty())
            .map(|i| i.zone.as_str())
            .collect()
    }

    /// Run `f` against every member and wait for a quorum of successes.
    ///
    /// With `n` members and an error budget of `e`, the first `n - e` members
    /// are called right away. The remaining ones are hedges: each waits for
    /// `delay`, or for a failure elsewhere, before it is called. A zero
    /// `delay` calls everyone immediately.
    ///
    /// Returns the successful results (in completion order, not member
    /// order) once `n - e` calls succeeded. Fails with the error of the call
    /// that exceeded the error budget, with `TooManyZoneFailures` when the
    /// zone budget is in use and failures cover too many zones, or with
    /// `Canceled` when `cancel` fires first. Cancellation wins over budget
    /// errors that arrive at the same time.
    ///
    /// Every call gets a child of `cancel`, which is cancelled as soon as this
    /// function returns or its future is dropped; remaining tasks are aborted.
    /// Deadlines are the caller's business (e.g. `tokio::time::timeout`).
    pub async fn do_until_quorum<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        delay: Duration,
        f: F,
    ) -> Result<Vec<T>, QuorumError<E>>
    where
        F: Fn(CancellationToken, InstanceDesc) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let zone_budget = self.max_unavailable_zones > 0;
        let max_errors = if zone_budget { 0 } else { self.max_errors };
        let min_success = self.instances.len().saturating_sub(max_errors);

        let ctx = cancel.child_token();
        let _cancel_on_return = ctx.clone().drop_guard();
        let force_start = Arc::new(Semaphore::new(0));
        let f = Arc::new(f);

        let mut tasks = JoinSet::new();
        for (idx, instance) in self.instances.iter().cloned().enumerate() {
            let ctx = ctx.clone();
            let f = Arc::clone(&f);
            let force_start = Arc::clone(&force_start);
            let hedge = idx >= min_success && !delay.is_zero();

            tasks.spawn(async move {
                if hedge {
                    tokio::select! {
                        _ = ctx.cancelled() => return None,
                        permit = force_start.acquire() => {
                            if let Ok(permit) = permit {
                                permit.forget();
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                let zone = instance.zone.clone();
                Some((zone, f(ctx, instance).await))
            });
        }

        let outcome = self
            .collect(cancel, &mut tasks, &force_start, min_success, max_errors, zone_budget)
            .await;
        if let Err(err) = &outcome {
            metrics::counter!("ring_quorum_failures_total", "reason" => err.reason()).increment(1);
        }
        outcome
    }

    async fn collect<T, E>(
        &self,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<Option<(String, Result<T, E>)>>,
        force_start: &Semaphore,
        min_success: usize,
        max_errors: usize,
        zone_budget: bool,
    ) -> Result<Vec<T>, QuorumError<E>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut results = Vec::with_capacity(min_success);
        let mut required = min_success;
        let mut num_errors = 0;
        let mut failed_zones: HashSet<String> = HashSet::new();

        while results.len() < required {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QuorumError::Canceled),
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (zone, result) = match joined {
                Ok(Some(outcome)) => outcome,
                // Hedge that never started.
                Ok(None) => continue,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => continue,
            };

            match result {
                Ok(value) => results.push(value),
                Err(_) if zone_budget => {
                    failed_zones.insert(zone);
                    if failed_zones.len() > self.max_unavailable_zones {
                        return Err(QuorumError::TooManyZoneFailures);
                    }
                    // A failure inside a tolerated zone no longer needs an answer.
                    required = required.saturating_sub(1);
                    force_start.add_permits(1);
                }
                Err(err) => {
                    num_errors += 1;
                    if num_errors > max_errors {
                        return Err(QuorumError::Replica(err));
                    }
                    force_start.add_permits(1);
                }
            }
        }

        if results.len() < required {
            return Err(QuorumError::Canceled);
        }
        Ok(results)
    }
}

/// Whether two replication sets differ in anything but heartbeat timestamps.
///
/// Members are compared pairwise after sorting both sides by address.
pub fn has_replication_set_changed(before: &ReplicationSet, after: &ReplicationSet) -> bool {
    if before.instances.len() != after.instances.len() {
        return true;
    }

    let mut before: Vec<&InstanceDesc> = before.instances.iter().collect();
    let mut after: Vec<&InstanceDesc> = after.instances.iter().collect();
    before.sort_by(|a, b| a.addr.cmp(&b.addr));
    after.sort_by(|a, b| a.addr.cmp(&b.addr));

    before
        .iter()
        .zip(after.iter())
        .any(|(b, a)| !b.same_ignoring_timestamp(a))
}
