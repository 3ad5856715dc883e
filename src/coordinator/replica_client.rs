//! Calls from a coordinator to shard replicas

use crate::common::{Error, ReplicaDescriptor, Result, ShardQuery, ShardSearchResponse};
use async_trait::async_trait;
use std::time::Duration;

/// How the coordinator reaches a replica.
///
/// Implementations must not apply their own retries; the health monitor and
/// the quorum executor bound every call with their own timeouts.
#[async_trait]
pub trait ReplicaTransport: Send + Sync + 'static {
    /// Liveness probe; `Ok` means the replica is ready to serve.
    async fn probe(&self, replica: &ReplicaDescriptor) -> Result<()>;

    /// Search call against one replica.
    async fn search(
        &self,
        replica: &ReplicaDescriptor,
        query: &ShardQuery,
    ) -> Result<ShardSearchResponse>;
}

/// HTTP/JSON transport speaking the shard replica's internal API.
#[derive(Clone)]
pub struct HttpReplicaClient {
    client: reqwest::Client,
}

impl HttpReplicaClient {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

fn transient(replica: &ReplicaDescriptor, err: impl std::fmt::Display) -> Error {
    Error::Transient {
        replica: replica.replica_id.clone(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl ReplicaTransport for HttpReplicaClient {
    async fn probe(&self, replica: &ReplicaDescriptor) -> Result<()> {
        let url = format!("{}/internal/ready", replica.address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transient(replica, e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(transient(replica, format!("status={}", resp.status())))
        }
    }

    async fn search(
        &self,
        replica: &ReplicaDescriptor,
        query: &ShardQuery,
    ) -> Result<ShardSearchResponse> {
        let url = format!("{}/internal/search", replica.address);
        let resp = self
            .client
            .post(&url)
            .json(query)
            .send()
            .await
            .map_err(|e| transient(replica, e))?;
        if !resp.status().is_success() {
            return Err(transient(replica, format!("status={}", resp.status())));
        }
        resp.json::<ShardSearchResponse>()
            .await
            .map_err(|e| transient(replica, e))
    }
}
