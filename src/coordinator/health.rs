//! Replica health monitor
//!
//! Every configured replica gets its own probe task. Probe outcomes drive a
//! three-state machine:
//!
//! ```text
//!            1 failure                 N failures or down_timeout
//!   ALIVE ─────────────▶ SUSPECT ─────────────────────────────▶ DOWN
//!     ▲                    │                                     │
//!     └──── 1 success ─────┘                                     │
//!     └──────────────────── M consecutive successes ─────────────┘
//! ```
//!
//! The table is owned by one coordinator instance, starts optimistic (all
//! ALIVE) and is never persisted. Readers get cloned snapshots.

use crate::common::{timestamp_now_millis, NodeState, ReplicaDescriptor, ShardGroup};
use crate::coordinator::replica_client::ReplicaTransport;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Timing and thresholds of the failure detector
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    /// Interval between two probes of one replica
    pub heartbeat_interval: Duration,
    /// Timeout of one probe, below `heartbeat_interval`
    pub probe_timeout: Duration,
    /// SUSPECT goes DOWN once the last success is older than this
    pub down_timeout: Duration,
    /// Consecutive failures moving SUSPECT to DOWN
    pub suspect_threshold: u32,
    /// Consecutive successes moving DOWN to ALIVE
    pub confirm_successes: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(1000),
            probe_timeout: Duration::from_millis(500),
            down_timeout: Duration::from_millis(5000),
            suspect_threshold: 3,
            confirm_successes: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Health of one replica as tracked by this coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaHealthState {
    pub replica_id: String,
    pub status: NodeState,
    /// Monotonic time of the last successful probe (start time until one succeeds)
    pub last_success: Instant,
    /// Wall-clock time of the last successful probe, for operators
    pub last_success_unix_ms: Option<i64>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl ReplicaHealthState {
    pub fn new(replica_id: impl Into<String>, now: Instant) -> Self {
        Self {
            replica_id: replica_id.into(),
            status: NodeState::Alive,
            last_success: now,
            last_success_unix_ms: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// Apply one probe outcome. Pure: the result depends only on the arguments.
pub fn transition(
    state: &ReplicaHealthState,
    outcome: ProbeOutcome,
    now: Instant,
    policy: &HealthPolicy,
) -> ReplicaHealthState {
    let mut next = state.clone();
    match outcome {
        ProbeOutcome::Success => {
            next.consecutive_failures = 0;
            next.consecutive_successes = next.consecutive_successes.saturating_add(1);
            next.last_success = now;
            next.status = match state.status {
                NodeState::Alive | NodeState::Suspect => NodeState::Alive,
                NodeState::Down if next.consecutive_successes >= policy.confirm_successes => {
                    NodeState::Alive
                }
                NodeState::Down => NodeState::Down,
            };
        }
        ProbeOutcome::Failure => {
            next.consecutive_successes = 0;
            next.consecutive_failures = next.consecutive_failures.saturating_add(1);
            if next.status == NodeState::Alive {
                next.status = NodeState::Suspect;
            }
            if next.status == NodeState::Suspect {
                let silent_for = now.saturating_duration_since(next.last_success);
                if next.consecutive_failures >= policy.suspect_threshold
                    || silent_for > policy.down_timeout
                {
                    next.status = NodeState::Down;
                }
            }
        }
    }
    next
}

/// Row of the operator-facing health table
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaStatusView {
    pub replica_id: String,
    pub shard_group_id: String,
    pub address: String,
    pub status: NodeState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_success_unix_ms: Option<i64>,
    pub last_success_ms_ago: u64,
}

/// Per-coordinator failure detector for every configured replica.
pub struct HealthMonitor {
    /// All replicas, in configuration order
    replicas: Vec<ReplicaDescriptor>,
    table: RwLock<HashMap<String, ReplicaHealthState>>,
    transport: Arc<dyn ReplicaTransport>,
    policy: HealthPolicy,
}

impl HealthMonitor {
    pub fn new(
        groups: &[ShardGroup],
        transport: Arc<dyn ReplicaTransport>,
        policy: HealthPolicy,
    ) -> Self {
        let now = Instant::now();
        let replicas: Vec<ReplicaDescriptor> = groups
            .iter()
            .flat_map(|g| g.replicas.iter().cloned())
            .collect();
        let table = replicas
            .iter()
            .map(|r| {
                (
                    r.replica_id.clone(),
                    ReplicaHealthState::new(r.replica_id.clone(), now),
                )
            })
            .collect();

        Self {
            replicas,
            table: RwLock::new(table),
            transport,
            policy,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Status of every replica of `group` from one consistent snapshot,
    /// in configuration order. Replicas unknown to the monitor read as DOWN.
    pub fn group_snapshot(&self, group: &ShardGroup) -> Vec<(ReplicaDescriptor, NodeState)> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        group
            .replicas
            .iter()
            .map(|r| {
                let status = table
                    .get(&r.replica_id)
                    .map(|s| s.status)
                    .unwrap_or(NodeState::Down);
                (r.clone(), status)
            })
            .collect()
    }

    /// Replicas of `group` eligible for a query, in configuration order.
    pub fn get_candidates(
        &self,
        group: &ShardGroup,
        include_suspect: bool,
    ) -> Vec<ReplicaDescriptor> {
        self.group_snapshot(group)
            .into_iter()
            .filter(|(_, status)| status.can_read(include_suspect))
            .map(|(r, _)| r)
            .collect()
    }

    pub fn status_of(&self, replica_id: &str) -> Option<NodeState> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.get(replica_id).map(|s| s.status)
    }

    /// Copy of the whole table, in configuration order.
    pub fn snapshot(&self) -> Vec<ReplicaHealthState> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        self.replicas
            .iter()
            .filter_map(|r| table.get(&r.replica_id).cloned())
            .collect()
    }

    pub fn status_table(&self) -> Vec<ReplicaStatusView> {
        let now = Instant::now();
        let snapshot = self.snapshot();
        self.replicas
            .iter()
            .zip(snapshot)
            .map(|(r, s)| ReplicaStatusView {
                replica_id: r.replica_id.clone(),
                shard_group_id: r.shard_group_id.clone(),
                address: r.address.clone(),
                status: s.status,
                consecutive_failures: s.consecutive_failures,
                consecutive_successes: s.consecutive_successes,
                last_success_unix_ms: s.last_success_unix_ms,
                last_success_ms_ago: crate::common::duration_ms(
                    now.saturating_duration_since(s.last_success),
                ),
            })
            .collect()
    }

    /// Apply one probe outcome; returns the new status.
    pub fn record(&self, replica_id: &str, outcome: ProbeOutcome) -> Option<NodeState> {
        self.record_at(replica_id, outcome, Instant::now())
    }

    pub fn record_at(
        &self,
        replica_id: &str,
        outcome: ProbeOutcome,
        now: Instant,
    ) -> Option<NodeState> {
        let (before, after) = {
            let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
            let entry = table.get_mut(replica_id)?;
            let mut next = transition(entry, outcome, now, &self.policy);
            if outcome == ProbeOutcome::Success {
                next.last_success_unix_ms = Some(timestamp_now_millis());
            }
            let before = entry.status;
            *entry = next;
            (before, entry.status)
        };

        if before != after {
            match after {
                NodeState::Alive => {
                    tracing::info!(replica_id, from = %before, to = %after, "Replica recovered")
                }
                _ => {
                    tracing::warn!(replica_id, from = %before, to = %after, "Replica degraded")
                }
            }
        }
        Some(after)
    }

    /// Probe one replica, bounded by the probe timeout, and record the outcome.
    pub async fn probe_replica(&self, replica: &ReplicaDescriptor) -> ProbeOutcome {
        let outcome =
            match tokio::time::timeout(self.policy.probe_timeout, self.transport.probe(replica))
                .await
            {
                Ok(Ok(())) => ProbeOutcome::Success,
                Ok(Err(e)) => {
                    tracing::debug!(replica_id = %replica.replica_id, error = %e, "Probe failed");
                    ProbeOutcome::Failure
                }
                Err(_) => {
                    tracing::debug!(replica_id = %replica.replica_id, "Probe timed out");
                    ProbeOutcome::Failure
                }
            };
        self.record(&replica.replica_id, outcome);
        outcome
    }

    /// One concurrent probe round over every replica.
    pub async fn probe_all(&self) {
        let probes = self.replicas.iter().map(|r| self.probe_replica(r));
        futures_util::future::join_all(probes).await;
    }

    /// Spawn one repeating probe task per replica.
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let interval = self.policy.heartbeat_interval;
        let tasks = self
            .replicas
            .iter()
            .cloned()
            .map(|replica| {
                let monitor = Arc::clone(self);
                tokio::spawn(async move {
                    // Spread the first probes so replicas are not hit in lockstep
                    let max_jitter = u64::try_from(interval.as_millis() / 4).unwrap_or(0);
                    let jitter = rand::thread_rng().gen_range(0..=max_jitter);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;

                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        monitor.probe_replica(&replica).await;
                    }
                })
            })
            .collect();

        tracing::info!(
            replicas = self.replicas.len(),
            interval_ms = %interval.as_millis(),
            "Health monitor started"
        );
        MonitorHandle::new(tasks)
    }
}

/// Owns the probe tasks; dropping it stops them.
pub struct MonitorHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    pub fn shutdown(self) {
        // Drop aborts the tasks
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::test_support::{group, Behavior, MockTransport};

    fn policy() -> HealthPolicy {
        HealthPolicy {
            heartbeat_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(50),
            down_timeout: Duration::from_secs(60),
            suspect_threshold: 3,
            confirm_successes: 2,
        }
    }

    fn fail(state: &ReplicaHealthState, now: Instant) -> ReplicaHealthState {
        transition(state, ProbeOutcome::Failure, now, &policy())
    }

    fn succeed(state: &ReplicaHealthState, now: Instant) -> ReplicaHealthState {
        transition(state, ProbeOutcome::Success, now, &policy())
    }

    #[test]
    fn test_single_failure_makes_suspect() {
        let now = Instant::now();
        let state = ReplicaHealthState::new("a", now);
        let next = fail(&state, now);
        assert_eq!(next.status, NodeState::Suspect);
        assert_eq!(next.consecutive_failures, 1);
        assert_eq!(next.consecutive_successes, 0);
    }

    #[test]
    fn test_threshold_failures_make_down() {
        let now = Instant::now();
        let mut state = ReplicaHealthState::new("a", now);
        state = fail(&state, now);
        state = fail(&state, now);
        assert_eq!(state.status, NodeState::Suspect);
        state = fail(&state, now);
        assert_eq!(state.status, NodeState::Down);
        assert_eq!(state.consecutive_failures, 3);
    }

    #[test]
    fn test_down_timeout_makes_down() {
        let start = Instant::now();
        let state = ReplicaHealthState::new("a", start);
        let state = fail(&state, start);
        assert_eq!(state.status, NodeState::Suspect);

        let later = start + Duration::from_secs(61);
        let state = fail(&state, later);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.status, NodeState::Down);
    }

    #[test]
    fn test_suspect_recovers_on_one_success() {
        let now = Instant::now();
        let state = fail(&ReplicaHealthState::new("a", now), now);
        let state = succeed(&state, now);
        assert_eq!(state.status, NodeState::Alive);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_down_needs_confirmed_successes() {
        let now = Instant::now();
        let mut state = ReplicaHealthState::new("a", now);
        for _ in 0..3 {
            state = fail(&state, now);
        }
        assert_eq!(state.status, NodeState::Down);

        state = succeed(&state, now);
        assert_eq!(state.status, NodeState::Down);

        // A failure in between resets the streak
        state = fail(&state, now);
        state = succeed(&state, now);
        assert_eq!(state.status, NodeState::Down);

        state = succeed(&state, now);
        assert_eq!(state.status, NodeState::Alive);
        assert_eq!(state.consecutive_successes, 2);
    }

    #[test]
    fn test_success_updates_last_success() {
        let start = Instant::now();
        let later = start + Duration::from_secs(5);
        let state = succeed(&ReplicaHealthState::new("a", start), later);
        assert_eq!(state.last_success, later);
    }

    #[test]
    fn test_candidates_follow_config_order() {
        let g = group("0", &["a", "b", "c"], 2);
        let monitor = HealthMonitor::new(
            std::slice::from_ref(&g),
            Arc::new(MockTransport::new()),
            policy(),
        );

        monitor.record("b", ProbeOutcome::Failure);
        let alive: Vec<_> = monitor
            .get_candidates(&g, false)
            .into_iter()
            .map(|r| r.replica_id)
            .collect();
        assert_eq!(alive, vec!["a", "c"]);

        let with_suspect: Vec<_> = monitor
            .get_candidates(&g, true)
            .into_iter()
            .map(|r| r.replica_id)
            .collect();
        assert_eq!(with_suspect, vec!["a", "b", "c"]);

        for _ in 0..2 {
            monitor.record("b", ProbeOutcome::Failure);
        }
        assert_eq!(monitor.status_of("b"), Some(NodeState::Down));
        assert_eq!(monitor.get_candidates(&g, true).len(), 2);
    }

    #[test]
    fn test_unknown_replica_is_ignored() {
        let g = group("0", &["a"], 1);
        let monitor = HealthMonitor::new(&[g], Arc::new(MockTransport::new()), policy());
        assert_eq!(monitor.record("zz", ProbeOutcome::Failure), None);
    }

    #[tokio::test]
    async fn test_hanging_replica_does_not_block_peers() {
        let g = group("0", &["a", "b", "c"], 2);
        let transport = Arc::new(MockTransport::new());
        transport.set("b", Behavior::Hang);
        transport.set("c", Behavior::Fail);
        let monitor = HealthMonitor::new(&[g], transport.clone(), policy());

        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(2), monitor.probe_all())
            .await
            .expect("probe round must be bounded by the probe timeout");
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(monitor.status_of("a"), Some(NodeState::Alive));
        assert_eq!(monitor.status_of("b"), Some(NodeState::Suspect));
        assert_eq!(monitor.status_of("c"), Some(NodeState::Suspect));
        assert_eq!(transport.probe_calls(), 3);
    }

    #[tokio::test]
    async fn test_background_probes_rediscover_replica() {
        let g = group("0", &["a"], 1);
        let transport = Arc::new(MockTransport::new());
        transport.set("a", Behavior::Fail);
        let policy = HealthPolicy {
            heartbeat_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(10),
            ..policy()
        };
        let monitor = Arc::new(HealthMonitor::new(&[g], transport.clone(), policy));
        let handle = monitor.start();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while monitor.status_of("a") != Some(NodeState::Down) {
            assert!(std::time::Instant::now() < deadline, "replica never went down");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        transport.set("a", Behavior::ok(vec![]));
        while monitor.status_of("a") != Some(NodeState::Alive) {
            assert!(std::time::Instant::now() < deadline, "replica never recovered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.shutdown();
        let table = monitor.status_table();
        assert_eq!(table[0].replica_id, "a");
        assert!(table[0].last_success_unix_ms.is_some());
    }
}
