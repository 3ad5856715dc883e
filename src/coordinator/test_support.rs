//! Scripted replica transport for coordinator unit tests

use crate::common::{
    Error, ReplicaDescriptor, Result, ScoredHit, ShardGroup, ShardQuery, ShardSearchResponse,
};
use crate::coordinator::replica_client::ReplicaTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer after `delay` with `hits`
    Ok { delay: Duration, hits: Vec<ScoredHit> },
    /// Fail immediately
    Fail,
    /// Never answer
    Hang,
}

impl Behavior {
    pub fn ok(hits: Vec<ScoredHit>) -> Self {
        Behavior::Ok {
            delay: Duration::ZERO,
            hits,
        }
    }

    pub fn delayed(delay: Duration, hits: Vec<ScoredHit>) -> Self {
        Behavior::Ok { delay, hits }
    }
}

/// Replicas default to answering immediately with no hits.
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    probe_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, replica_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(replica_id.to_string(), behavior);
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn behavior(&self, replica_id: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(replica_id)
            .cloned()
            .unwrap_or_else(|| Behavior::ok(vec![]))
    }

    async fn act(&self, replica: &ReplicaDescriptor) -> Result<Vec<ScoredHit>> {
        match self.behavior(&replica.replica_id) {
            Behavior::Ok { delay, hits } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(hits)
            }
            Behavior::Fail => Err(Error::ConnectionFailed(format!(
                "{} refused",
                replica.replica_id
            ))),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ReplicaTransport for MockTransport {
    async fn probe(&self, replica: &ReplicaDescriptor) -> Result<()> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.act(replica).await.map(|_| ())
    }

    async fn search(
        &self,
        replica: &ReplicaDescriptor,
        _query: &ShardQuery,
    ) -> Result<ShardSearchResponse> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let hits = self.act(replica).await?;
        Ok(ShardSearchResponse {
            replica_id: replica.replica_id.clone(),
            shard_group_id: replica.shard_group_id.clone(),
            hits,
            took_ms: 0,
        })
    }
}

pub fn group(group_id: &str, replica_ids: &[&str], quorum_size: usize) -> ShardGroup {
    let replicas = replica_ids
        .iter()
        .map(|id| ReplicaDescriptor {
            replica_id: id.to_string(),
            shard_group_id: group_id.to_string(),
            address: format!("http://{}.test", id),
        })
        .collect();
    ShardGroup::new(group_id, replicas, quorum_size).unwrap()
}

pub fn hit(doc_id: u64, score: f64) -> ScoredHit {
    ScoredHit {
        doc_id,
        score,
        matched_fields: vec!["title".to_string()],
        explanation: None,
    }
}
