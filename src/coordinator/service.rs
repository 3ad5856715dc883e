//! Cluster-wide query execution
//!
//! One quorum fan-out per shard group, run concurrently, then a global
//! re-sort and pagination.

use crate::common::{
    duration_ms, Error, QueryRequest, Result, SearchResponse, ShardGroup, METRICS,
};
use crate::coordinator::merge::{paginate, sort_hits};
use crate::coordinator::quorum::QuorumExecutor;
use std::time::Instant;

pub struct CoordinatorService {
    groups: Vec<ShardGroup>,
    executor: QuorumExecutor,
    fail_open: bool,
}

impl CoordinatorService {
    pub fn new(groups: Vec<ShardGroup>, executor: QuorumExecutor, fail_open: bool) -> Self {
        Self {
            groups,
            executor,
            fail_open,
        }
    }

    pub fn groups(&self) -> &[ShardGroup] {
        &self.groups
    }

    pub fn executor(&self) -> &QuorumExecutor {
        &self.executor
    }

    pub async fn search(&self, request: &QueryRequest) -> Result<SearchResponse> {
        request.validate()?;
        let start = Instant::now();
        let query = request.shard_query();

        let results = futures_util::future::join_all(
            self.groups
                .iter()
                .map(|group| self.executor.execute(group, &query)),
        )
        .await;

        let mut hits = Vec::new();
        let mut degraded = false;
        let mut failed_groups = Vec::new();
        let mut first_error: Option<Error> = None;

        for (group, result) in self.groups.iter().zip(results) {
            match result {
                Ok(merged) => {
                    degraded |= merged.degraded;
                    hits.extend(merged.hits);
                }
                Err(e) if self.fail_open && is_group_unavailable(&e) => {
                    tracing::warn!(group_id = %group.group_id, error = %e, "Dropping shard group from result");
                    failed_groups.push(group.group_id.clone());
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        if failed_groups.len() == self.groups.len() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        if !failed_groups.is_empty() {
            degraded = true;
        }

        // Groups are disjoint by doc_id, so concatenation needs no dedup
        sort_hits(&mut hits);
        let total_hits = hits.len();
        let mut page = paginate(hits, request.page, request.page_size);
        if !request.debug {
            for hit in &mut page {
                hit.explanation = None;
            }
        }

        if degraded {
            METRICS.degraded_responses.inc();
        }

        let took = start.elapsed();
        tracing::info!(
            total_hits,
            returned = page.len(),
            degraded,
            took_ms = %took.as_millis(),
            "Search served"
        );

        Ok(SearchResponse {
            hits: page,
            total_hits,
            degraded,
            took_ms: duration_ms(took),
            page: request.page,
            page_size: request.page_size,
            failed_groups,
        })
    }

    /// Groups whose healthy candidates currently reach quorum.
    pub fn ready_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| self.executor.select(g).candidates.len() >= g.quorum_size)
            .count()
    }
}

fn is_group_unavailable(e: &Error) -> bool {
    matches!(
        e,
        Error::InsufficientReplicas { .. } | Error::QuorumNotMet { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ScoredHit, SuspectPolicy};
    use crate::coordinator::health::{HealthMonitor, HealthPolicy, ProbeOutcome};
    use crate::coordinator::quorum::QueryPolicy;
    use crate::coordinator::test_support::{group, hit, Behavior, MockTransport};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(
        groups: Vec<ShardGroup>,
        transport: Arc<MockTransport>,
        fail_open: bool,
    ) -> (Arc<HealthMonitor>, CoordinatorService) {
        let monitor = Arc::new(HealthMonitor::new(
            &groups,
            transport.clone(),
            HealthPolicy::default(),
        ));
        let policy = QueryPolicy {
            query_timeout: Duration::from_millis(200),
            total_timeout: Duration::from_millis(300),
            grace: Duration::ZERO,
            suspect_policy: SuspectPolicy::Exclude,
        };
        let executor = QuorumExecutor::new(monitor.clone(), transport, policy);
        (monitor, CoordinatorService::new(groups, executor, fail_open))
    }

    fn down(monitor: &HealthMonitor, replica_id: &str) {
        for _ in 0..3 {
            monitor.record(replica_id, ProbeOutcome::Failure);
        }
    }

    fn ids(hits: &[ScoredHit]) -> Vec<u64> {
        hits.iter().map(|h| h.doc_id).collect()
    }

    #[tokio::test]
    async fn test_validation_happens_before_fan_out() {
        let transport = Arc::new(MockTransport::new());
        let (_, svc) = service(vec![group("0", &["a"], 1)], transport.clone(), true);

        let mut req = QueryRequest::new("x");
        assert!(matches!(svc.search(&req).await, Err(Error::Validation(_))));

        req.query_text = "matrix".into();
        req.page_size = 51;
        assert!(matches!(svc.search(&req).await, Err(Error::Validation(_))));

        req.page_size = 10;
        req.page = 0;
        assert!(matches!(svc.search(&req).await, Err(Error::Validation(_))));

        assert_eq!(transport.search_calls(), 0);
    }

    #[tokio::test]
    async fn test_groups_are_merged_and_paginated() {
        let transport = Arc::new(MockTransport::new());
        // Even docs on group 0, odd docs on group 1
        let even: Vec<ScoredHit> = (0..25u64)
            .filter(|d| d % 2 == 0)
            .map(|d| hit(d, 100.0 - d as f64))
            .collect();
        let odd: Vec<ScoredHit> = (0..25u64)
            .filter(|d| d % 2 == 1)
            .map(|d| hit(d, 100.0 - d as f64))
            .collect();
        transport.set("0-0", Behavior::ok(even));
        transport.set("1-0", Behavior::ok(odd));
        let groups = vec![group("0", &["0-0"], 1), group("1", &["1-0"], 1)];
        let (_, svc) = service(groups, transport, true);

        let mut req = QueryRequest::new("matrix");
        req.page = 2;
        req.page_size = 10;
        let resp = svc.search(&req).await.unwrap();

        assert_eq!(resp.total_hits, 25);
        assert_eq!(ids(&resp.hits), (10..20).collect::<Vec<u64>>());
        assert!(!resp.degraded);
        assert!(resp.failed_groups.is_empty());

        req.page = 4;
        let resp = svc.search(&req).await.unwrap();
        assert!(resp.hits.is_empty());
        assert_eq!(resp.total_hits, 25);
    }

    #[tokio::test]
    async fn test_explanations_only_in_debug() {
        let transport = Arc::new(MockTransport::new());
        let mut explained = hit(1, 1.0);
        explained.explanation = Some("title:matrix".into());
        transport.set("a", Behavior::ok(vec![explained]));
        let (_, svc) = service(vec![group("0", &["a"], 1)], transport, true);

        let mut req = QueryRequest::new("matrix");
        let resp = svc.search(&req).await.unwrap();
        assert_eq!(resp.hits[0].explanation, None);

        req.debug = true;
        let resp = svc.search(&req).await.unwrap();
        assert_eq!(resp.hits[0].explanation.as_deref(), Some("title:matrix"));
    }

    #[tokio::test]
    async fn test_fail_open_drops_unavailable_group() {
        let transport = Arc::new(MockTransport::new());
        transport.set("0-0", Behavior::ok(vec![hit(2, 1.0)]));
        let groups = vec![group("0", &["0-0"], 1), group("1", &["1-0"], 1)];
        let (monitor, svc) = service(groups, transport, true);
        down(&monitor, "1-0");

        let resp = svc.search(&QueryRequest::new("matrix")).await.unwrap();
        assert!(resp.degraded);
        assert_eq!(resp.failed_groups, vec!["1".to_string()]);
        assert_eq!(ids(&resp.hits), vec![2]);
    }

    #[tokio::test]
    async fn test_fail_closed_returns_group_error() {
        let transport = Arc::new(MockTransport::new());
        let groups = vec![group("0", &["0-0"], 1), group("1", &["1-0"], 1)];
        let (monitor, svc) = service(groups, transport, false);
        down(&monitor, "1-0");

        let err = svc.search(&QueryRequest::new("matrix")).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientReplicas { .. }));
    }

    #[tokio::test]
    async fn test_all_groups_failing_returns_error() {
        let transport = Arc::new(MockTransport::new());
        transport.set("a", Behavior::Fail);
        let (_, svc) = service(vec![group("0", &["a"], 1)], transport, true);

        let err = svc.search(&QueryRequest::new("matrix")).await.unwrap_err();
        match err {
            Error::QuorumNotMet {
                achieved, required, ..
            } => assert_eq!((achieved, required), (0, 1)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ready_groups() {
        let transport = Arc::new(MockTransport::new());
        let groups = vec![group("0", &["a", "b"], 2), group("1", &["c"], 1)];
        let (monitor, svc) = service(groups, transport, true);
        assert_eq!(svc.ready_groups(), 2);

        down(&monitor, "b");
        assert_eq!(svc.ready_groups(), 1);
    }
}
