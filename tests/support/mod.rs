//! Helpers starting real servers on ephemeral ports

#![allow(dead_code)]

use minisearch::common::{
    CoordinatorConfig, GroupConfig, ReplicaConfig, RouterConfig, ShardConfig, SuspectPolicy,
};
use minisearch::{Coordinator, RouterServer, ShardServer};
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// URL of a port nothing listens on
pub fn closed_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

pub async fn wait_for_status(url: &str, expected: u16) {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().as_u16() == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never answered {}", url, expected);
}

/// `count` documents titled "matrix part <id>", ids starting at 1
pub fn movie_docs(count: u64) -> Vec<Value> {
    (1..=count)
        .map(|id| {
            let genre = if id % 2 == 0 { "Action" } else { "Drama" };
            serde_json::json!({
                "id": id,
                "title": format!("Matrix part {}", id),
                "genres": [genre],
            })
        })
        .collect()
}

pub struct Shard {
    pub url: String,
    _dir: TempDir,
}

pub async fn spawn_shard(
    replica_id: &str,
    group_id: &str,
    docs: &[Value],
    shard_index: u64,
    num_shards: u64,
) -> Shard {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("docs.json");
    std::fs::write(&path, serde_json::to_vec(docs).unwrap()).unwrap();

    let (listener, url) = bind().await;
    let config = ShardConfig {
        replica_id: replica_id.to_string(),
        shard_group_id: group_id.to_string(),
        data_path: Some(path),
        shard_index,
        num_shards,
        ..Default::default()
    };
    tokio::spawn(ShardServer::new(config).serve_on(listener, std::future::pending()));
    wait_for_status(&format!("{}/internal/ready", url), 200).await;

    Shard { url, _dir: dir }
}

pub fn group(group_id: &str, addresses: &[&str], quorum_size: usize) -> GroupConfig {
    GroupConfig {
        group_id: group_id.to_string(),
        quorum_size: Some(quorum_size),
        replicas: addresses
            .iter()
            .enumerate()
            .map(|(i, address)| ReplicaConfig {
                replica_id: format!("{}-{}", group_id, i),
                address: address.to_string(),
            })
            .collect(),
    }
}

pub fn coordinator_config(groups: Vec<GroupConfig>) -> CoordinatorConfig {
    CoordinatorConfig {
        heartbeat_interval_ms: 100,
        probe_timeout_ms: 50,
        query_timeout_ms: 500,
        total_timeout_ms: 800,
        suspect_policy: SuspectPolicy::Exclude,
        groups,
        ..Default::default()
    }
}

pub async fn spawn_coordinator(config: CoordinatorConfig) -> String {
    let (listener, url) = bind().await;
    tokio::spawn(
        Coordinator::new(config, "coord-test".to_string())
            .serve_on(listener, std::future::pending()),
    );
    wait_for_status(&format!("{}/health/live", url), 200).await;
    url
}

pub async fn spawn_router(coordinators: Vec<String>, max_retries: usize) -> String {
    let (listener, url) = bind().await;
    let config = RouterConfig {
        coordinators,
        heartbeat_interval_ms: 200,
        probe_timeout_ms: 100,
        forward_timeout_ms: 2000,
        max_retries,
        ..Default::default()
    };
    tokio::spawn(
        RouterServer::new(config, "router-test".to_string())
            .serve_on(listener, std::future::pending()),
    );
    wait_for_status(&format!("{}/health/live", url), 200).await;
    url
}
