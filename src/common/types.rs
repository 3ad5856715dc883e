//! Cluster topology and query data model shared by every role

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Smallest accepted query length (after trimming)
pub const MIN_QUERY_LEN: usize = 2;
/// Largest accepted query length (after trimming)
pub const MAX_QUERY_LEN: usize = 100;
/// Largest page a client may request
pub const MAX_PAGE_SIZE: usize = 50;

/// One configured copy of a shard's index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaDescriptor {
    pub replica_id: String,
    pub shard_group_id: String,
    /// Base URL, e.g. `http://10.0.0.7:8001`
    pub address: String,
}

/// Replicas holding identical copies of one index partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardGroup {
    pub group_id: String,
    /// Configuration order; candidate selection and merging follow it.
    pub replicas: Vec<ReplicaDescriptor>,
    pub quorum_size: usize,
}

impl ShardGroup {
    pub fn new(
        group_id: impl Into<String>,
        replicas: Vec<ReplicaDescriptor>,
        quorum_size: usize,
    ) -> Result<Self> {
        let group = Self {
            group_id: group_id.into(),
            replicas,
            quorum_size,
        };
        group.validate()?;
        Ok(group)
    }

    /// Checks `1 <= quorum_size <= replica_count` and replica membership.
    pub fn validate(&self) -> Result<()> {
        if self.replicas.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "shard group {} has no replicas",
                self.group_id
            )));
        }
        if self.quorum_size == 0 || self.quorum_size > self.replicas.len() {
            return Err(Error::InvalidConfig(format!(
                "shard group {}: quorum_size {} must be within 1..={}",
                self.group_id,
                self.quorum_size,
                self.replicas.len()
            )));
        }
        if let Some(r) = self
            .replicas
            .iter()
            .find(|r| r.shard_group_id != self.group_id)
        {
            return Err(Error::InvalidConfig(format!(
                "replica {} belongs to group {}, not {}",
                r.replica_id, r.shard_group_id, self.group_id
            )));
        }
        Ok(())
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}

/// Client query as accepted by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_text: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub debug: bool,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            filters: BTreeMap::new(),
            page: default_page(),
            page_size: default_page_size(),
            debug: false,
        }
    }

    /// Boundary validation, run before any fan-out.
    pub fn validate(&self) -> Result<()> {
        let len = self.query_text.trim().chars().count();
        if !(MIN_QUERY_LEN..=MAX_QUERY_LEN).contains(&len) {
            return Err(Error::Validation(format!(
                "query must be between {} and {} characters",
                MIN_QUERY_LEN, MAX_QUERY_LEN
            )));
        }
        if self.page < 1 {
            return Err(Error::Validation("page must be >= 1".into()));
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "page_size must be within 1..={}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// The part of the request a shard replica sees.
    pub fn shard_query(&self) -> ShardQuery {
        ShardQuery {
            query_text: self.query_text.trim().to_string(),
            filters: self.filters.clone(),
        }
    }
}

/// Body of the shard replica search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardQuery {
    pub query_text: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    pub doc_id: u64,
    pub score: f64,
    #[serde(default)]
    pub matched_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Wire response of the shard replica search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSearchResponse {
    #[serde(default)]
    pub replica_id: String,
    #[serde(default)]
    pub shard_group_id: String,
    pub hits: Vec<ScoredHit>,
    #[serde(default)]
    pub took_ms: u64,
}

/// Outcome of one fan-out call as seen by the coordinator.
#[derive(Debug, Clone)]
pub struct ReplicaResponse {
    pub replica_id: String,
    pub hits: Vec<ScoredHit>,
    pub latency: std::time::Duration,
    pub error: Option<String>,
}

impl ReplicaResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Deduplicated, ranked hits of one shard group (or of the whole cluster).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedResult {
    pub hits: Vec<ScoredHit>,
    pub total_hits: usize,
    pub degraded: bool,
}

/// Coordinator response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<ScoredHit>,
    pub total_hits: usize,
    pub degraded: bool,
    pub took_ms: u64,
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub failed_groups: Vec<String>,
}

/// Whether SUSPECT replicas may serve queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspectPolicy {
    /// ALIVE replicas only
    Exclude,
    /// ALIVE and SUSPECT replicas
    Include,
    /// ALIVE only, unless that leaves the group below quorum
    #[default]
    Fallback,
}

impl std::str::FromStr for SuspectPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" => Ok(SuspectPolicy::Exclude),
            "include" => Ok(SuspectPolicy::Include),
            "fallback" => Ok(SuspectPolicy::Fallback),
            other => Err(Error::InvalidConfig(format!(
                "unknown suspect policy: {}",
                other
            ))),
        }
    }
}
