//! Quorum-gated scatter/gather over one shard group
//!
//! Candidates come from the health monitor. Each gets one concurrent search
//! call bounded by `query_timeout`. The fan-out completes as soon as
//! `quorum_size` calls succeeded (plus an optional grace window for late
//! arrivals), when every call settled, or at the `total_timeout` deadline.
//! Calls still in flight at that point are dropped.

use crate::common::{
    Error, MergedResult, NodeState, ReplicaDescriptor, ReplicaResponse, Result, ShardGroup,
    ShardQuery, SuspectPolicy, METRICS,
};
use crate::coordinator::health::HealthMonitor;
use crate::coordinator::merge::merge_replica_hits;
use crate::coordinator::replica_client::ReplicaTransport;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Fan-out timing and candidate policy
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    /// Timeout of one replica call
    pub query_timeout: Duration,
    /// Deadline of the whole fan-out
    pub total_timeout: Duration,
    /// Extra wait for stragglers once quorum is met
    pub grace: Duration,
    pub suspect_policy: SuspectPolicy,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_millis(2000),
            total_timeout: Duration::from_millis(2500),
            grace: Duration::ZERO,
            suspect_policy: SuspectPolicy::default(),
        }
    }
}

/// Replicas chosen for one fan-out
#[derive(Debug, Clone)]
pub struct Selection {
    pub candidates: Vec<ReplicaDescriptor>,
    /// SUSPECT replicas were left out
    pub suspect_excluded: bool,
    /// SUSPECT replicas were taken in
    pub suspect_included: bool,
}

impl Selection {
    fn choose(monitor: &HealthMonitor, group: &ShardGroup, policy: SuspectPolicy) -> Self {
        let snapshot = monitor.group_snapshot(group);
        let alive_count = snapshot
            .iter()
            .filter(|(_, s)| *s == NodeState::Alive)
            .count();
        let suspect_count = snapshot
            .iter()
            .filter(|(_, s)| *s == NodeState::Suspect)
            .count();

        let include_suspect = match policy {
            SuspectPolicy::Exclude => false,
            SuspectPolicy::Include => true,
            SuspectPolicy::Fallback => alive_count < group.quorum_size,
        };

        Self {
            candidates: monitor.get_candidates(group, include_suspect),
            suspect_excluded: !include_suspect && suspect_count > 0,
            suspect_included: include_suspect && suspect_count > 0,
        }
    }
}

/// Outcome of one fan-out
struct FanOut {
    /// Indexed like the candidates, `None` for abandoned calls
    responses: Vec<Option<ReplicaResponse>>,
    /// Failures observed before completion
    failures: usize,
    /// `total_timeout` ended the wait while calls were still in flight
    deadline_cut: bool,
}

pub struct QuorumExecutor {
    monitor: Arc<HealthMonitor>,
    transport: Arc<dyn ReplicaTransport>,
    policy: QueryPolicy,
}

impl QuorumExecutor {
    pub fn new(
        monitor: Arc<HealthMonitor>,
        transport: Arc<dyn ReplicaTransport>,
        policy: QueryPolicy,
    ) -> Self {
        Self {
            monitor,
            transport,
            policy,
        }
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// Candidate selection under the configured suspect policy.
    pub fn select(&self, group: &ShardGroup) -> Selection {
        Selection::choose(&self.monitor, group, self.policy.suspect_policy)
    }

    /// Query one shard group and merge the replies.
    pub async fn execute(&self, group: &ShardGroup, query: &ShardQuery) -> Result<MergedResult> {
        let selection = self.select(group);
        let candidates = &selection.candidates;

        if candidates.len() < group.quorum_size {
            METRICS.insufficient_replicas.inc();
            tracing::warn!(
                group_id = %group.group_id,
                available = candidates.len(),
                required = group.quorum_size,
                "Not enough healthy replicas, skipping fan-out"
            );
            return Err(Error::InsufficientReplicas {
                group: group.group_id.clone(),
                needed: group.quorum_size,
                available: candidates.len(),
            });
        }

        let FanOut {
            responses,
            failures,
            deadline_cut,
        } = self.fan_out(group, candidates, query).await;
        let successes = responses.iter().flatten().filter(|r| r.is_success()).count();

        if successes < group.quorum_size {
            METRICS.quorum_not_met.inc();
            tracing::warn!(
                group_id = %group.group_id,
                achieved = successes,
                required = group.quorum_size,
                "Quorum not met"
            );
            return Err(Error::QuorumNotMet {
                group: group.group_id.clone(),
                achieved: successes,
                required: group.quorum_size,
            });
        }

        let hits = merge_replica_hits(responses.iter().flatten());
        let degraded = failures > 0
            || deadline_cut
            || selection.suspect_excluded
            || selection.suspect_included;

        tracing::debug!(
            group_id = %group.group_id,
            candidates = candidates.len(),
            successes,
            failures,
            deadline_cut,
            hits = hits.len(),
            degraded,
            "Group query complete"
        );

        Ok(MergedResult {
            total_hits: hits.len(),
            hits,
            degraded,
        })
    }

    async fn fan_out(
        &self,
        group: &ShardGroup,
        candidates: &[ReplicaDescriptor],
        query: &ShardQuery,
    ) -> FanOut {
        let deadline = Instant::now() + self.policy.total_timeout;
        let query_timeout = self.policy.query_timeout;

        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(idx, replica)| {
                let transport = Arc::clone(&self.transport);
                let replica = replica.clone();
                let query = query.clone();
                async move {
                    let started = Instant::now();
                    let result =
                        tokio::time::timeout(query_timeout, transport.search(&replica, &query))
                            .await;
                    let (hits, error) = match result {
                        Ok(Ok(resp)) => (resp.hits, None),
                        Ok(Err(e)) => (Vec::new(), Some(e.to_string())),
                        Err(_) => (
                            Vec::new(),
                            Some(format!("timed out after {}ms", query_timeout.as_millis())),
                        ),
                    };
                    let response = ReplicaResponse {
                        replica_id: replica.replica_id,
                        hits,
                        latency: started.elapsed(),
                        error,
                    };
                    (idx, response)
                }
            })
            .collect();

        let mut responses: Vec<Option<ReplicaResponse>> = vec![None; candidates.len()];
        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut stop_at = deadline;
        let mut quorum_met = false;
        let mut deadline_cut = false;

        loop {
            match tokio::time::timeout_at(stop_at, pending.next()).await {
                Ok(Some((idx, response))) => {
                    METRICS.record_replica_call(
                        &group.group_id,
                        response.latency,
                        response.is_success(),
                    );
                    match &response.error {
                        None => successes += 1,
                        Some(error) => {
                            failures += 1;
                            tracing::debug!(
                                group_id = %group.group_id,
                                replica_id = %response.replica_id,
                                error = %error,
                                "Replica call failed"
                            );
                        }
                    }
                    responses[idx] = Some(response);

                    if !quorum_met && successes >= group.quorum_size {
                        quorum_met = true;
                        if self.policy.grace.is_zero() {
                            break;
                        }
                        stop_at = deadline.min(Instant::now() + self.policy.grace);
                    }
                }
                // Every call settled
                Ok(None) => break,
                Err(_) => {
                    // A grace window shorter than the deadline ends quietly
                    if stop_at == deadline {
                        deadline_cut = !pending.is_empty();
                        tracing::debug!(
                            group_id = %group.group_id,
                            in_flight = pending.len(),
                            quorum_met,
                            "Fan-out deadline reached"
                        );
                    }
                    break;
                }
            }
        }

        // Dropping the set abandons stragglers
        drop(pending);
        FanOut {
            responses,
            failures,
            deadline_cut,
        }
    }
}
