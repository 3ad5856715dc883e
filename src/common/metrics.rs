//! Metrics collection
//!
//! Prometheus-compatible counters, gauges and latency histograms:
//! - request latency per endpoint
//! - fan-out call outcomes per shard group
//! - quorum failures and degraded responses
//! - router retries

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in milliseconds
    pub fn observe(&self, value_ms: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&b| value_ms <= b)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative bucket counts, ending with +Inf
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.buckets.len());

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    /// Sum of all observed values in milliseconds
    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Success/error counts plus latency for one label value
#[derive(Debug, Default)]
pub struct LabeledMetrics {
    pub total: Counter,
    pub success: Counter,
    pub error: Counter,
    pub latency: Histogram,
}

impl LabeledMetrics {
    fn record(&self, duration: Duration, success: bool) {
        self.total.inc();
        self.latency.observe(duration.as_secs_f64() * 1000.0);
        if success {
            self.success.inc();
        } else {
            self.error.inc();
        }
    }
}

/// Metrics registry shared by all handlers of a process
#[derive(Debug)]
pub struct MetricsRegistry {
    /// Per-endpoint request metrics
    endpoints: Mutex<BTreeMap<String, Arc<LabeledMetrics>>>,

    /// Per-shard-group fan-out call metrics
    groups: Mutex<BTreeMap<String, Arc<LabeledMetrics>>>,

    pub total_requests: Counter,
    pub total_errors: Counter,
    pub degraded_responses: Counter,
    pub insufficient_replicas: Counter,
    pub quorum_not_met: Counter,
    pub router_retries: Counter,
    pub active_requests: Gauge,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(BTreeMap::new()),
            groups: Mutex::new(BTreeMap::new()),
            total_requests: Counter::new(),
            total_errors: Counter::new(),
            degraded_responses: Counter::new(),
            insufficient_replicas: Counter::new(),
            quorum_not_met: Counter::new(),
            router_retries: Counter::new(),
            active_requests: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    fn labeled(
        map: &Mutex<BTreeMap<String, Arc<LabeledMetrics>>>,
        label: &str,
    ) -> Arc<LabeledMetrics> {
        let mut map = map.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(label.to_string()).or_default().clone()
    }

    /// Get or create metrics for an endpoint, keyed by route template
    pub fn endpoint(&self, path: &str) -> Arc<LabeledMetrics> {
        Self::labeled(&self.endpoints, path)
    }

    /// Get or create fan-out metrics for a shard group
    pub fn group(&self, group_id: &str) -> Arc<LabeledMetrics> {
        Self::labeled(&self.groups, group_id)
    }

    /// Record a served request under its route label
    pub fn record_request(&self, path: &str, duration: Duration, success: bool) {
        self.endpoint(path).record(duration, success);
        self.total_requests.inc();
        if !success {
            self.total_errors.inc();
        }
    }

    /// Record one replica call made during a fan-out
    pub fn record_replica_call(&self, group_id: &str, duration: Duration, success: bool) {
        self.group(group_id).record(duration, success);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = [
            ("minisearch_requests_total", "Total number of requests", self.total_requests.get()),
            ("minisearch_errors_total", "Total number of failed requests", self.total_errors.get()),
            (
                "minisearch_degraded_responses_total",
                "Responses served without full replica participation",
                self.degraded_responses.get(),
            ),
            (
                "minisearch_insufficient_replicas_total",
                "Group queries rejected before fan-out",
                self.insufficient_replicas.get(),
            ),
            (
                "minisearch_quorum_not_met_total",
                "Group queries that missed quorum",
                self.quorum_not_met.get(),
            ),
            (
                "minisearch_router_retries_total",
                "Forwarded searches retried on another coordinator",
                self.router_retries.get(),
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value);
        }

        out.push_str("# HELP minisearch_active_requests Requests currently in flight\n");
        out.push_str("# TYPE minisearch_active_requests gauge\n");
        let _ = writeln!(out, "minisearch_active_requests {}", self.active_requests.get());

        out.push_str("# HELP minisearch_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE minisearch_uptime_seconds gauge\n");
        let _ = writeln!(out, "minisearch_uptime_seconds {}", self.uptime_seconds());

        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        write_labeled(
            &mut out,
            "minisearch_request",
            "path",
            "Request duration in milliseconds",
            &endpoints,
        );
        drop(endpoints);

        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        write_labeled(
            &mut out,
            "minisearch_replica_call",
            "group",
            "Replica search call duration in milliseconds",
            &groups,
        );

        out
    }
}

fn write_labeled(
    out: &mut String,
    prefix: &str,
    label: &str,
    help: &str,
    metrics: &BTreeMap<String, Arc<LabeledMetrics>>,
) {
    let _ = writeln!(out, "# TYPE {}_total counter", prefix);
    for (value, m) in metrics {
        let _ = writeln!(out, "{}_total{{{}=\"{}\"}} {}", prefix, label, value, m.total.get());
    }
    let _ = writeln!(out, "# TYPE {}_errors_total counter", prefix);
    for (value, m) in metrics {
        let _ = writeln!(
            out,
            "{}_errors_total{{{}=\"{}\"}} {}",
            prefix,
            label,
            value,
            m.error.get()
        );
    }

    let _ = writeln!(out, "# HELP {}_duration_ms {}", prefix, help);
    let _ = writeln!(out, "# TYPE {}_duration_ms histogram", prefix);
    for (value, m) in metrics {
        for (le, count) in m.latency.get_buckets() {
            let le = if le.is_infinite() {
                "+Inf".to_string()
            } else {
                le.to_string()
            };
            let _ = writeln!(
                out,
                "{}_duration_ms_bucket{{{}=\"{}\",le=\"{}\"}} {}",
                prefix, label, value, le, count
            );
        }
        let _ = writeln!(
            out,
            "{}_duration_ms_sum{{{}=\"{}\"}} {}",
            prefix,
            label,
            value,
            m.latency.sum()
        );
        let _ = writeln!(
            out,
            "{}_duration_ms_count{{{}=\"{}\"}} {}",
            prefix,
            label,
            value,
            m.latency.count()
        );
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);
