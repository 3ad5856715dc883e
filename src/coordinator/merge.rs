//! Deterministic hit merging and pagination

use crate::common::{ReplicaResponse, ScoredHit};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Ranking order: score descending, then doc_id ascending.
pub fn compare_hits(a: &ScoredHit, b: &ScoredHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

pub fn sort_hits(hits: &mut [ScoredHit]) {
    hits.sort_by(compare_hits);
}

/// Union of the hits of successful replica responses, deduplicated by doc_id.
///
/// `responses` must be in candidate order: when several replicas report the
/// same document, the first one's copy is kept regardless of arrival order.
pub fn merge_replica_hits<'a, I>(responses: I) -> Vec<ScoredHit>
where
    I: IntoIterator<Item = &'a ReplicaResponse>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for response in responses.into_iter().filter(|r| r.is_success()) {
        for hit in &response.hits {
            if seen.insert(hit.doc_id) {
                merged.push(hit.clone());
            }
        }
    }
    sort_hits(&mut merged);
    merged
}

/// Slice `[(page-1)*page_size, page*page_size)`; empty past the end.
pub fn paginate(hits: Vec<ScoredHit>, page: usize, page_size: usize) -> Vec<ScoredHit> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    hits.into_iter().skip(start).take(page_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hit(doc_id: u64, score: f64) -> ScoredHit {
        ScoredHit {
            doc_id,
            score,
            matched_fields: vec![],
            explanation: None,
        }
    }

    fn response(replica_id: &str, hits: Vec<ScoredHit>) -> ReplicaResponse {
        ReplicaResponse {
            replica_id: replica_id.to_string(),
            hits,
            latency: Duration::from_millis(1),
            error: None,
        }
    }

    #[test]
    fn test_sort_by_score_then_doc_id() {
        let mut hits = vec![hit(7, 1.0), hit(3, 2.0), hit(5, 1.0), hit(1, 0.5)];
        sort_hits(&mut hits);
        let ids: Vec<u64> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, vec![3, 5, 7, 1]);
    }

    #[test]
    fn test_union_keeps_first_reporter_score() {
        let a = response("a", vec![hit(1, 1.0), hit(2, 3.0)]);
        let c = response("c", vec![hit(1, 9.0), hit(4, 2.0)]);

        let merged = merge_replica_hits([&a, &c]);
        let pairs: Vec<(u64, f64)> = merged.iter().map(|h| (h.doc_id, h.score)).collect();
        assert_eq!(pairs, vec![(2, 3.0), (4, 2.0), (1, 1.0)]);
    }

    #[test]
    fn test_failed_responses_are_ignored() {
        let a = response("a", vec![hit(1, 1.0)]);
        let mut b = response("b", vec![hit(2, 5.0)]);
        b.error = Some("timeout".into());

        let merged = merge_replica_hits([&b, &a]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].doc_id, 1);
    }

    #[test]
    fn test_paginate() {
        let hits: Vec<ScoredHit> = (0..25).map(|i| hit(i, 100.0 - i as f64)).collect();

        let page = paginate(hits.clone(), 2, 10);
        let ids: Vec<u64> = page.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, (10..20).collect::<Vec<u64>>());

        assert_eq!(paginate(hits.clone(), 3, 10).len(), 5);
        assert!(paginate(hits, 4, 10).is_empty());
    }
}
