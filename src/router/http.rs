//! HTTP API for the router
//!
//! `/search` is forwarded to one ALIVE coordinator and the coordinator's
//! answer is relayed as-is. Only transport failures move on to another
//! coordinator.

use crate::common::tracing_middleware::{
    generate_request_id, request_tracing_middleware, REQUEST_ID_HEADER,
};
use crate::common::{Error, METRICS};
use crate::router::registry::CoordinatorRegistry;
use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Header naming the coordinator that served the request
pub const ROUTED_TO_HEADER: &str = "X-Routed-To";

#[derive(Clone)]
pub struct RouterState {
    pub node_id: String,
    pub registry: Arc<CoordinatorRegistry>,
}

pub fn create_router(state: RouterState) -> Router {
    Router::new()
        .route("/search", axum::routing::get(search))
        .route("/health", axum::routing::get(health))
        .route("/health/live", axum::routing::get(health_live))
        .route("/health/ready", axum::routing::get(health_ready))
        .route("/health/coordinators", axum::routing::get(health_coordinators))
        .route("/metrics", axum::routing::get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(request_tracing_middleware)),
        )
        .with_state(state)
}

async fn search(
    State(state): State<RouterState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_request_id);
    let query = query.unwrap_or_default();

    match forward(&state.registry, &query, &request_id).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "No coordinator could serve");
            e.into_response()
        }
    }
}

/// Try coordinators in round-robin order until one answers over HTTP.
pub async fn forward(
    registry: &Arc<CoordinatorRegistry>,
    query: &str,
    request_id: &str,
) -> crate::Result<Response> {
    let attempts = registry.select_attempts();
    if attempts.is_empty() {
        return Err(Error::UpstreamUnavailable("no coordinator is alive".into()));
    }

    let mut last_error = String::new();
    for (attempt, url) in attempts.iter().enumerate() {
        if attempt > 0 {
            METRICS.router_retries.inc();
            tracing::info!(coordinator = %url, attempt, "Retrying on another coordinator");
        }

        let _inflight = registry.begin(url);
        let started = Instant::now();
        let result = registry
            .client()
            .get(format!("{}/search?{}", url, query))
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(registry.policy().forward_timeout)
            .send()
            .await;

        let upstream = match result {
            Ok(resp) => resp,
            Err(e) => {
                // Every send error is a transport failure of this coordinator
                let err = Error::from(e);
                registry.mark_down(url, err.to_string());
                last_error = format!("{}: {}", url, err);
                continue;
            }
        };

        let status = upstream.status();
        let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
        let body = match upstream.bytes().await {
            Ok(body) => body,
            Err(e) => {
                registry.mark_down(url, e.to_string());
                last_error = format!("{}: {}", url, e);
                continue;
            }
        };
        registry.mark_alive(url, started.elapsed());

        tracing::debug!(
            coordinator = %url,
            status = %status.as_u16(),
            duration_ms = %started.elapsed().as_millis(),
            "Relayed coordinator response"
        );

        let mut response = Response::builder().status(status);
        if let Some(content_type) = content_type {
            response = response.header(header::CONTENT_TYPE, content_type);
        }
        if let Ok(value) = HeaderValue::from_str(url) {
            response = response.header(ROUTED_TO_HEADER, value);
        }
        return response
            .body(Body::from(body))
            .map_err(|e| Error::Internal(e.to_string()));
    }

    Err(Error::UpstreamUnavailable(format!(
        "all {} attempt(s) failed, last: {}",
        attempts.len(),
        last_error
    )))
}

async fn health(State(state): State<RouterState>) -> impl IntoResponse {
    let coordinators = state.registry.snapshot();
    let alive = coordinators
        .iter()
        .filter(|c| c.status.is_healthy())
        .count();

    axum::Json(json!({
        "status": "healthy",
        "role": "router",
        "node_id": state.node_id,
        "coordinators": { "alive": alive, "total": coordinators.len() },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

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

/// 200 iff at least one coordinator is ALIVE
async fn health_ready(State(state): State<RouterState>) -> impl IntoResponse {
    let ready = state.registry.any_alive();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(json!({ "ready": ready })))
}

async fn health_coordinators(State(state): State<RouterState>) -> impl IntoResponse {
    axum::Json(json!({ "coordinators": state.registry.snapshot() }))
}

async fn metrics(State(state): State<RouterState>) -> impl IntoResponse {
    let mut out = String::new();
    for c in state.registry.snapshot() {
        out += &format!(
            "minisearch_coordinator_up{{url=\"{}\"}} {}\n",
            c.url,
            u8::from(c.status.is_healthy())
        );
        out += &format!(
            "minisearch_coordinator_routed_total{{url=\"{}\"}} {}\n",
            c.url, c.total_routed
        );
        out += &format!(
            "minisearch_coordinator_inflight{{url=\"{}\"}} {}\n",
            c.url, c.inflight
        );
    }
    out += &METRICS.to_prometheus();
    (StatusCode::OK, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::tracing_middleware::UNMATCHED_ROUTE;
    use crate::router::registry::RouterPolicy;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let registry = CoordinatorRegistry::new(
            &["http://127.0.0.1:1".to_string()],
            RouterPolicy::default(),
        )
        .unwrap();
        create_router(RouterState {
            node_id: "router-test".into(),
            registry: Arc::new(registry),
        })
    }

    async fn get(app: &Router, uri: &str) -> StatusCode {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_unknown_paths_share_one_metrics_series() {
        let app = app();
        for i in 0..50 {
            assert_eq!(
                get(&app, &format!("/no-such-route-{}", i)).await,
                StatusCode::NOT_FOUND
            );
        }
        assert_eq!(get(&app, "/health/live").await, StatusCode::OK);

        let text = METRICS.to_prometheus();
        assert!(!text.contains("/no-such-route-"));
        assert!(text.contains(&format!("path=\"{}\"", UNMATCHED_ROUTE)));
        assert!(text.contains("path=\"/health/live\""));
    }
}
