//! HTTP API for the coordinator
//!
//! - `GET /search` runs a cluster query
//! - `GET /health`, `/health/live`, `/health/ready` for orchestration probes
//! - `GET /health/replicas` dumps the replica health table
//! - `GET /metrics` in Prometheus text format

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{Error, NodeState, QueryRequest, Result, METRICS};
use crate::coordinator::health::HealthMonitor;
use crate::coordinator::service::CoordinatorService;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Prefix of query parameters forwarded to shards as filters (`filter.lang=en`)
const FILTER_PREFIX: &str = "filter.";

#[derive(Clone)]
pub struct CoordState {
    pub node_id: String,
    pub service: Arc<CoordinatorService>,
    pub monitor: Arc<HealthMonitor>,
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/search", axum::routing::get(search))
        .route("/health", axum::routing::get(health))
        .route("/health/live", axum::routing::get(health_live))
        .route("/health/ready", axum::routing::get(health_ready))
        .route("/health/replicas", axum::routing::get(health_replicas))
        .route("/metrics", axum::routing::get(metrics))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build a `QueryRequest` from raw query parameters.
///
/// Parsed by hand so malformed numbers surface as `VALIDATION_ERROR`
/// instead of the extractor's plain-text rejection.
pub fn parse_search_params(params: &HashMap<String, String>) -> Result<QueryRequest> {
    let q = params
        .get("q")
        .ok_or_else(|| Error::Validation("missing query parameter q".into()))?;
    let mut request = QueryRequest::new(q.as_str());

    if let Some(page) = params.get("page") {
        request.page = page
            .parse()
            .map_err(|_| Error::Validation(format!("invalid page: {}", page)))?;
    }
    if let Some(size) = params.get("page_size") {
        request.page_size = size
            .parse()
            .map_err(|_| Error::Validation(format!("invalid page_size: {}", size)))?;
    }
    if let Some(debug) = params.get("debug") {
        request.debug = matches!(debug.as_str(), "1" | "true" | "yes");
    }
    request.filters = params
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(FILTER_PREFIX)
                .map(|field| (field.to_string(), v.clone()))
        })
        .collect();

    Ok(request)
}

async fn search(
    State(state): State<CoordState>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<impl IntoResponse, Error> {
    let request = parse_search_params(&params)?;
    let response = state.service.search(&request).await.map_err(|e| {
        tracing::warn!(code = e.code(), error = %e, "Search failed");
        e
    })?;
    Ok(axum::Json(response))
}

async fn health(State(state): State<CoordState>) -> impl IntoResponse {
    let table = state.monitor.snapshot();
    let count = |s: NodeState| table.iter().filter(|r| r.status == s).count();

    axum::Json(json!({
        "status": "healthy",
        "role": "coordinator",
        "node_id": state.node_id,
        "replicas": {
            "alive": count(NodeState::Alive),
            "suspect": count(NodeState::Suspect),
            "down": count(NodeState::Down),
        },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Returns 200 while the process can answer
async fn health_live() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(json!({
            "alive": true,
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().timestamp(),
        })),
    )
}

/// Returns 200 when every shard group can reach quorum
async fn health_ready(State(state): State<CoordState>) -> impl IntoResponse {
    let total = state.service.groups().len();
    let ready = state.service.ready_groups();
    let status = if ready == total {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        axum::Json(json!({
            "ready": ready == total,
            "ready_groups": ready,
            "total_groups": total,
        })),
    )
}

async fn health_replicas(State(state): State<CoordState>) -> impl IntoResponse {
    axum::Json(json!({ "replicas": state.monitor.status_table() }))
}

async fn metrics(State(state): State<CoordState>) -> impl IntoResponse {
    let mut out = String::new();
    for row in state.monitor.status_table() {
        let value = match row.status {
            NodeState::Alive => 0,
            NodeState::Suspect => 1,
            NodeState::Down => 2,
        };
        out += &format!(
            "minisearch_replica_state{{replica_id=\"{}\",group=\"{}\"}} {}\n",
            row.replica_id, row.shard_group_id, value
        );
    }
    out += &METRICS.to_prometheus();
    (StatusCode::OK, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_search_params() {
        let req = parse_search_params(&params(&[
            ("q", "matrix"),
            ("page", "2"),
            ("page_size", "5"),
            ("debug", "true"),
            ("filter.lang", "en"),
        ]))
        .unwrap();

        assert_eq!(req.query_text, "matrix");
        assert_eq!(req.page, 2);
        assert_eq!(req.page_size, 5);
        assert!(req.debug);
        assert_eq!(req.filters.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn test_parse_defaults() {
        let req = parse_search_params(&params(&[("q", "matrix")])).unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 10);
        assert!(!req.debug);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn test_malformed_params_are_validation_errors() {
        assert!(matches!(
            parse_search_params(&params(&[])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_search_params(&params(&[("q", "matrix"), ("page", "two")])),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_search_params(&params(&[("q", "matrix"), ("page_size", "-1")])),
            Err(Error::Validation(_))
        ));
    }
}
