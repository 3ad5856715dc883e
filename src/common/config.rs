//! Configuration for minisearch components
//!
//! Sources, lowest priority first: built-in defaults, the TOML file named by
//! `MINISEARCH_CONFIG` (default `minisearch.toml`, optional), then
//! `MINISEARCH__SECTION__FIELD` environment variables. Binaries apply CLI
//! flags on top.

use crate::common::{Error, ReplicaDescriptor, Result, ShardGroup, SuspectPolicy};
use crate::coordinator::health::HealthPolicy;
use crate::coordinator::quorum::QueryPolicy;
use crate::router::registry::RouterPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "MINISEARCH_CONFIG";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID (stable identity supplied by the deployment)
    pub node_id: String,

    /// Role (router, coordinator or shard) the file was written for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<NodeRole>,

    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    /// Router-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterConfig>,

    /// Shard-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardConfig>,

    /// Logging level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            role: None,
            coordinator: None,
            router: None,
            shard: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from the config file and environment.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "minisearch.toml".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MINISEARCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Warn when a binary is started with a config file meant for another role.
    pub fn check_role(&self, expected: NodeRole) {
        if let Some(role) = self.role {
            if role != expected {
                tracing::warn!(
                    configured = ?role,
                    running = ?expected,
                    "Config file role does not match this binary"
                );
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Router,
    Coordinator,
    Shard,
}

/// One replica as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub replica_id: String,
    pub address: String,
}

/// One shard group as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub group_id: String,
    /// Defaults to a majority of the replicas
    #[serde(default)]
    pub quorum_size: Option<usize>,
    pub replicas: Vec<ReplicaConfig>,
}

impl GroupConfig {
    pub fn to_shard_group(&self) -> Result<ShardGroup> {
        let replicas = self
            .replicas
            .iter()
            .map(|r| ReplicaDescriptor {
                replica_id: r.replica_id.clone(),
                shard_group_id: self.group_id.clone(),
                address: r.address.trim_end_matches('/').to_string(),
            })
            .collect::<Vec<_>>();
        let quorum = self.quorum_size.unwrap_or(replicas.len() / 2 + 1);
        ShardGroup::new(self.group_id.clone(), replicas, quorum)
    }
}

/// Parse the compact group syntax `0=http://a:8001,http://b:8002;1=http://c:8003`.
///
/// Replica ids default to `<group>-<index>` and quorum to a majority.
pub fn parse_groups(compact: &str) -> Result<Vec<GroupConfig>> {
    let mut groups = Vec::new();
    for part in compact.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (group_id, urls) = part.split_once('=').ok_or_else(|| {
            Error::InvalidConfig(format!("group entry '{}' is missing '='", part))
        })?;
        let group_id = group_id.trim().to_string();
        let replicas: Vec<ReplicaConfig> = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .enumerate()
            .map(|(i, url)| ReplicaConfig {
                replica_id: format!("{}-{}", group_id, i),
                address: url.trim_end_matches('/').to_string(),
            })
            .collect();
        if replicas.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "group {} has no replica addresses",
                group_id
            )));
        }
        groups.push(GroupConfig {
            group_id,
            quorum_size: None,
            replicas,
        });
    }
    Ok(groups)
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bind address for HTTP API
    pub bind_addr: SocketAddr,

    /// Interval between two probes of the same replica
    pub heartbeat_interval_ms: u64,

    /// Timeout of a single probe (must be below the heartbeat interval)
    pub probe_timeout_ms: u64,

    /// SUSPECT replicas without a success for this long go DOWN
    pub down_timeout_ms: u64,

    /// Consecutive failures moving SUSPECT to DOWN
    pub suspect_threshold: u32,

    /// Consecutive successes moving DOWN back to ALIVE
    pub confirm_successes: u32,

    /// Timeout of one replica search call
    pub query_timeout_ms: u64,

    /// Global deadline of one group fan-out
    pub total_timeout_ms: u64,

    /// How long to wait for stragglers once quorum is met
    pub grace_ms: u64,

    pub suspect_policy: SuspectPolicy,

    /// Serve partial results when a group misses quorum
    pub fail_open: bool,

    pub groups: Vec<GroupConfig>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            heartbeat_interval_ms: 1000,
            probe_timeout_ms: 500,
            down_timeout_ms: 5000,
            suspect_threshold: 3,
            confirm_successes: 2,
            query_timeout_ms: 2000,
            total_timeout_ms: 2500,
            grace_ms: 0,
            suspect_policy: SuspectPolicy::default(),
            fail_open: true,
            groups: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_ms >= self.heartbeat_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "probe_timeout_ms ({}) must be below heartbeat_interval_ms ({})",
                self.probe_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.suspect_threshold == 0 || self.confirm_successes == 0 {
            return Err(Error::InvalidConfig(
                "suspect_threshold and confirm_successes must be >= 1".into(),
            ));
        }
        if self.query_timeout_ms == 0 || self.total_timeout_ms == 0 {
            return Err(Error::InvalidConfig("query timeouts must be > 0".into()));
        }
        if self.groups.is_empty() {
            return Err(Error::InvalidConfig("no shard groups configured".into()));
        }
        self.shard_groups().map(|_| ())
    }

    /// Build validated shard groups; replica ids must be unique cluster-wide.
    pub fn shard_groups(&self) -> Result<Vec<ShardGroup>> {
        let groups = self
            .groups
            .iter()
            .map(GroupConfig::to_shard_group)
            .collect::<Result<Vec<_>>>()?;

        let mut seen_groups = HashSet::new();
        let mut seen_replicas = HashSet::new();
        for group in &groups {
            if !seen_groups.insert(group.group_id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate shard group {}",
                    group.group_id
                )));
            }
            for replica in &group.replicas {
                if !seen_replicas.insert(replica.replica_id.as_str()) {
                    return Err(Error::InvalidConfig(format!(
                        "duplicate replica id {}",
                        replica.replica_id
                    )));
                }
            }
        }
        Ok(groups)
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            down_timeout: Duration::from_millis(self.down_timeout_ms),
            suspect_threshold: self.suspect_threshold,
            confirm_successes: self.confirm_successes,
        }
    }

    pub fn query_policy(&self) -> QueryPolicy {
        QueryPolicy {
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            total_timeout: Duration::from_millis(self.total_timeout_ms),
            grace: Duration::from_millis(self.grace_ms),
            suspect_policy: self.suspect_policy,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub bind_addr: SocketAddr,

    /// Coordinator base URLs
    pub coordinators: Vec<String>,

    pub heartbeat_interval_ms: u64,

    pub probe_timeout_ms: u64,

    /// Timeout of one forwarded search
    pub forward_timeout_ms: u64,

    /// Retries against other coordinators after a transport failure
    pub max_retries: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            coordinators: Vec::new(),
            heartbeat_interval_ms: 1000,
            probe_timeout_ms: 700,
            forward_timeout_ms: 3000,
            max_retries: 1,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.coordinators.is_empty() {
            return Err(Error::InvalidConfig("no coordinators configured".into()));
        }
        if self.probe_timeout_ms >= self.heartbeat_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "probe_timeout_ms ({}) must be below heartbeat_interval_ms ({})",
                self.probe_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> RouterPolicy {
        RouterPolicy {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            forward_timeout: Duration::from_millis(self.forward_timeout_ms),
            max_retries: self.max_retries,
        }
    }
}

/// Shard replica configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub bind_addr: SocketAddr,

    /// Stable replica identity supplied by the deployment
    pub replica_id: String,

    pub shard_group_id: String,

    /// JSON array of documents; empty index when unset
    pub data_path: Option<PathBuf>,

    /// Documents with `doc_id % num_shards == shard_index` belong here
    pub shard_index: u64,

    pub num_shards: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            replica_id: "0-0".to_string(),
            shard_group_id: "0".to_string(),
            data_path: None,
            shard_index: 0,
            num_shards: 1,
        }
    }
}

impl ShardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_shards == 0 || self.shard_index >= self.num_shards {
            return Err(Error::InvalidConfig(format!(
                "shard_index {} must be below num_shards {}",
                self.shard_index, self.num_shards
            )));
        }
        Ok(())
    }
}
