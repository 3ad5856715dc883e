//! Coordinator registry for the router
//!
//! Coordinators are either ALIVE or DOWN. Everything starts ALIVE; a probe
//! or a forwarded request that fails at the transport level marks the
//! coordinator DOWN until a later probe succeeds.

use crate::common::{duration_ms, timestamp_now_millis, NodeState, Result};
use crate::coordinator::health::MonitorHandle;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
pub struct RouterPolicy {
    pub heartbeat_interval: Duration,
    pub probe_timeout: Duration,
    /// Timeout of one forwarded request
    pub forward_timeout: Duration,
    /// Extra attempts after a transport failure
    pub max_retries: usize,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(1000),
            probe_timeout: Duration::from_millis(700),
            forward_timeout: Duration::from_millis(3000),
            max_retries: 1,
        }
    }
}

/// Operational state of one coordinator
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorState {
    pub url: String,
    pub status: NodeState,
    pub last_seen_unix_ms: Option<i64>,
    pub last_rtt_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub inflight: u64,
    pub total_routed: u64,
    pub last_error: Option<String>,
}

impl CoordinatorState {
    fn new(url: String) -> Self {
        Self {
            url,
            status: NodeState::Alive,
            last_seen_unix_ms: None,
            last_rtt_ms: None,
            consecutive_failures: 0,
            inflight: 0,
            total_routed: 0,
            last_error: None,
        }
    }
}

pub struct CoordinatorRegistry {
    states: Mutex<Vec<CoordinatorState>>,
    cursor: AtomicUsize,
    client: reqwest::Client,
    policy: RouterPolicy,
}

impl CoordinatorRegistry {
    pub fn new(coordinators: &[String], policy: RouterPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(policy.probe_timeout)
            .build()?;
        let states = coordinators
            .iter()
            .map(|url| CoordinatorState::new(url.trim_end_matches('/').to_string()))
            .collect();

        Ok(Self {
            states: Mutex::new(states),
            cursor: AtomicUsize::new(0),
            client,
            policy,
        })
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn with_state<T>(&self, url: &str, f: impl FnOnce(&mut CoordinatorState) -> T) -> Option<T> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.iter_mut().find(|s| s.url == url).map(f)
    }

    /// Up to `max_retries + 1` distinct ALIVE coordinators, rotated round-robin.
    pub fn select_attempts(&self) -> Vec<String> {
        let alive: Vec<String> = {
            let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            states
                .iter()
                .filter(|s| s.status == NodeState::Alive)
                .map(|s| s.url.clone())
                .collect()
        };
        if alive.is_empty() {
            return alive;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % alive.len();
        alive
            .iter()
            .cycle()
            .skip(start)
            .take(alive.len().min(self.policy.max_retries + 1))
            .cloned()
            .collect()
    }

    pub fn any_alive(&self) -> bool {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.iter().any(|s| s.status == NodeState::Alive)
    }

    pub fn status_of(&self, url: &str) -> Option<NodeState> {
        self.with_state(url, |s| s.status)
    }

    pub fn snapshot(&self) -> Vec<CoordinatorState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn mark_alive(&self, url: &str, rtt: Duration) {
        let before = self.with_state(url, |s| {
            let before = s.status;
            s.status = NodeState::Alive;
            s.consecutive_failures = 0;
            s.last_seen_unix_ms = Some(timestamp_now_millis());
            s.last_rtt_ms = Some(duration_ms(rtt));
            s.last_error = None;
            before
        });
        if before == Some(NodeState::Down) {
            tracing::info!(coordinator = %url, "Coordinator back up");
        }
    }

    pub fn mark_down(&self, url: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let before = self.with_state(url, |s| {
            let before = s.status;
            s.status = NodeState::Down;
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_error = Some(reason.clone());
            before
        });
        if before == Some(NodeState::Alive) {
            tracing::warn!(coordinator = %url, reason = %reason, "Coordinator marked down");
        }
    }

    /// Count a request routed to `url` until the guard drops.
    pub fn begin(self: &Arc<Self>, url: &str) -> InflightGuard {
        self.with_state(url, |s| {
            s.inflight += 1;
            s.total_routed += 1;
        });
        InflightGuard {
            registry: Arc::clone(self),
            url: url.to_string(),
        }
    }

    pub async fn probe(&self, url: &str) -> bool {
        let started = Instant::now();
        let request = self
            .client
            .get(format!("{}/health/live", url))
            .timeout(self.policy.probe_timeout)
            .send();

        match request.await {
            Ok(resp) if resp.status().is_success() => {
                self.mark_alive(url, started.elapsed());
                true
            }
            Ok(resp) => {
                self.mark_down(url, format!("status={}", resp.status()));
                false
            }
            Err(e) => {
                tracing::debug!(coordinator = %url, error = %e, "Probe failed");
                self.mark_down(url, e.to_string());
                false
            }
        }
    }

    pub async fn probe_all(&self) {
        let urls: Vec<String> = self.snapshot().into_iter().map(|s| s.url).collect();
        futures_util::future::join_all(urls.iter().map(|u| self.probe(u))).await;
    }

    /// Spawn one repeating probe task per coordinator.
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let interval = self.policy.heartbeat_interval;
        let tasks = self
            .snapshot()
            .into_iter()
            .map(|state| {
                let registry = Arc::clone(self);
                tokio::spawn(async move {
                    let max_jitter = u64::try_from(interval.as_millis() / 4).unwrap_or(0);
                    let jitter = rand::thread_rng().gen_range(0..=max_jitter);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;

                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        registry.probe(&state.url).await;
                    }
                })
            })
            .collect();
        MonitorHandle::new(tasks)
    }
}

pub struct InflightGuard {
    registry: Arc<CoordinatorRegistry>,
    url: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.registry.with_state(&self.url, |s| {
            s.inflight = s.inflight.saturating_sub(1);
        });
    }
}
