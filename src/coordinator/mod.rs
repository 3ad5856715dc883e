//! Coordinator: the query-facing tier
//!
//! The coordinator is responsible for:
//! - Failure detection of shard replicas (heartbeat probes)
//! - Quorum reads over each shard group
//! - Deterministic merge, global ranking and pagination

pub mod health;
pub mod http;
pub mod merge;
pub mod quorum;
pub mod replica_client;
pub mod server;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use health::{HealthMonitor, HealthPolicy, MonitorHandle};
pub use quorum::{QueryPolicy, QuorumExecutor};
pub use server::Coordinator;
pub use service::CoordinatorService;
