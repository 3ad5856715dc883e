//! Error types for minisearch

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Replica Errors ===
    #[error("Replica {replica} failed: {reason}")]
    Transient { replica: String, reason: String },

    // === Quorum Errors ===
    #[error("Insufficient replicas in group {group}: need {needed}, have {available}")]
    InsufficientReplicas {
        group: String,
        needed: usize,
        available: usize,
    },

    #[error("Quorum not met in group {group}: achieved {achieved}, required {required}")]
    QuorumNotMet {
        group: String,
        achieved: usize,
        required: usize,
    },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    // === Request Errors ===
    #[error("Invalid request: {0}")]
    Validation(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionFailed(_)
                | Error::Http(_)
                | Error::Transient { .. }
                | Error::UpstreamUnavailable(_)
        )
    }

    /// Machine-readable reason reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InsufficientReplicas { .. } => "INSUFFICIENT_REPLICAS",
            Error::QuorumNotMet { .. } => "QUORUM_NOT_MET",
            Error::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Error::NotReady(_) => "NOT_READY",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Transient { .. } | Error::ConnectionFailed(_) | Error::Http(_) => {
                "REPLICA_ERROR"
            }
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::InsufficientReplicas { .. }
            | Error::QuorumNotMet { .. }
            | Error::UpstreamUnavailable(_)
            | Error::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Transient { .. } | Error::ConnectionFailed(_) | Error::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Error {
    /// Structured context for the error body
    pub fn details(&self) -> serde_json::Value {
        match self {
            Error::InsufficientReplicas {
                group,
                needed,
                available,
            } => serde_json::json!({ "group": group, "needed": needed, "available": available }),
            Error::QuorumNotMet {
                group,
                achieved,
                required,
            } => serde_json::json!({ "group": group, "achieved": achieved, "required": required }),
            Error::Transient { replica, .. } => serde_json::json!({ "replica": replica }),
            _ => serde_json::json!({}),
        }
    }

    /// `{"error": {"code", "message", "details"}}`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "details": self.details(),
            }
        })
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (self.to_http_status(), axum::Json(self.to_json())).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() {
            Error::ConnectionFailed(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_quorum_errors_are_service_unavailable() {
        let err = Error::InsufficientReplicas {
            group: "0".into(),
            needed: 2,
            available: 1,
        };
        assert_eq!(err.to_http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "INSUFFICIENT_REPLICAS");

        let err = Error::QuorumNotMet {
            group: "0".into(),
            achieved: 1,
            required: 2,
        };
        assert_eq!(err.to_http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "QUORUM_NOT_MET");
        assert!(err.to_string().contains("achieved 1, required 2"));

        let body = err.to_json();
        assert_eq!(body["error"]["code"], "QUORUM_NOT_MET");
        assert_eq!(body["error"]["details"]["achieved"], 1);
        assert_eq!(body["error"]["details"]["required"], 2);
    }

    #[test]
    fn test_validation_is_bad_request() {
        let err = Error::Validation("page must be >= 1".into());
        assert_eq!(err.to_http_status(), StatusCode::BAD_REQUEST);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(Error::ConnectionFailed("refused".into()).is_retryable());
        assert!(Error::Timeout("probe".into()).is_retryable());
        assert!(!Error::Internal("bug".into()).is_retryable());
    }
}
