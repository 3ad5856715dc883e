//! Common utilities and types shared across minisearch

pub mod config;
pub mod error;
pub mod metrics;
pub mod tracing_middleware;
pub mod types;
pub mod utils;

pub use config::{
    parse_groups, Config, CoordinatorConfig, GroupConfig, NodeRole, ReplicaConfig, RouterConfig,
    ShardConfig,
};
pub use error::{Error, Result};
pub use metrics::METRICS;
pub use types::{
    MergedResult, QueryRequest, ReplicaDescriptor, ReplicaResponse, ScoredHit, SearchResponse,
    ShardGroup, ShardQuery, ShardSearchResponse, SuspectPolicy,
};
pub use utils::{duration_ms, parse_duration, timestamp_now_millis, NodeState};
