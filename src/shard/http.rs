//! Internal HTTP API of a shard replica

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{duration_ms, Error, ShardQuery, ShardSearchResponse, METRICS};
use crate::shard::index::SearchBackend;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Search bodies are a short query plus a few filters
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ShardState {
    pub replica_id: String,
    pub shard_group_id: String,
    /// Set once the index finished loading
    pub backend: Arc<OnceCell<Arc<dyn SearchBackend>>>,
}

impl ShardState {
    fn backend(&self) -> Result<&Arc<dyn SearchBackend>, Error> {
        self.backend
            .get()
            .ok_or_else(|| Error::NotReady(format!("replica {} is loading", self.replica_id)))
    }
}

pub fn create_router(state: ShardState) -> Router {
    Router::new()
        .route("/internal/search", axum::routing::post(search))
        .route("/internal/ready", axum::routing::get(ready))
        .route("/internal/health", axum::routing::get(health))
        .route("/metrics", axum::routing::get(metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn search(
    State(state): State<ShardState>,
    axum::Json(query): axum::Json<ShardQuery>,
) -> Result<impl IntoResponse, Error> {
    let start = Instant::now();
    let hits = state.backend()?.search(&query).await?;

    tracing::debug!(
        replica_id = %state.replica_id,
        hits = hits.len(),
        "Shard search served"
    );

    Ok(axum::Json(ShardSearchResponse {
        replica_id: state.replica_id.clone(),
        shard_group_id: state.shard_group_id.clone(),
        hits,
        took_ms: duration_ms(start.elapsed()),
    }))
}

/// 200 once the index is loaded, 503 before
async fn ready(State(state): State<ShardState>) -> impl IntoResponse {
    let ready = state.backend.initialized();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        axum::Json(json!({
            "replica_id": state.replica_id,
            "shard_group_id": state.shard_group_id,
            "status": if ready { "ready" } else { "not ready" },
        })),
    )
}

async fn health(State(state): State<ShardState>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "healthy",
        "role": "shard",
        "replica_id": state.replica_id,
        "shard_group_id": state.shard_group_id,
        "documents": state.backend.get().map(|b| b.document_count()).unwrap_or(0),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<ShardState>) -> impl IntoResponse {
    let documents = state.backend.get().map(|b| b.document_count()).unwrap_or(0);
    let mut out = format!(
        "minisearch_shard_documents{{replica_id=\"{}\"}} {}\n",
        state.replica_id, documents
    );
    out += &METRICS.to_prometheus();
    (StatusCode::OK, out)
}
