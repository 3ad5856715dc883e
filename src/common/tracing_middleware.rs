//! Structured logging and request tracing middleware
//!
//! Shared by the router, coordinator and shard servers:
//! - `X-Request-ID` extracted or generated for each request and echoed back
//! - one `http_request` span per request
//! - request timing recorded in the metrics registry

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::common::METRICS;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Metrics label shared by requests that matched no route
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Generate a new unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request ID of an incoming request, generated when the client sent none
pub fn request_id_of<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_request_id)
}

/// Route template of a request (`/search`, not the raw URI), so metric
/// labels stay bounded whatever paths clients send.
pub fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Middleware that adds request ID and structured logging to each request
pub async fn request_tracing_middleware(mut request: Request<Body>, next: Next) -> Response<Body> {
    let start = Instant::now();

    let request_id = request_id_of(&request);
    // Handlers that forward the request see the same id
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    METRICS.active_requests.inc();
    let mut response = next.run(request).instrument(span.clone()).await;
    METRICS.active_requests.dec();

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    METRICS.record_request(&route, duration, !status.is_server_error());

    let _guard = span.enter();
    if status.is_success() {
        info!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    } else if status.is_client_error() {
        warn!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Client error"
        );
    } else {
        warn!(
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Server error"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_id() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();

        assert!(Uuid::parse_str(&id1).is_ok());
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_request_id_passthrough() {
        let request = Request::builder()
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(())
            .unwrap();
        assert_eq!(request_id_of(&request), "abc-123");

        let request = Request::builder().body(()).unwrap();
        assert!(Uuid::parse_str(&request_id_of(&request)).is_ok());
    }

    #[test]
    fn test_route_label_without_match() {
        let request = Request::builder().uri("/anything/42").body(()).unwrap();
        assert_eq!(route_label(&request), UNMATCHED_ROUTE);
    }
}
