//! Error taxonomy for the proxy surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Usage hint rendered alongside target-resolution failures.
pub const USAGE: &str = "/proxy?url=<absolute-url> or /proxy/<scheme>/<host>/<path>";

/// Errors that can occur while resolving or proxying a request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No target URL in query, path, or Referer.
    #[error("no target URL found in query, path, or Referer")]
    MissingTarget,

    /// A candidate target string does not parse as an absolute http(s) URL.
    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    /// DNS resolution for the upstream host failed.
    #[error("upstream host could not be resolved: {0}")]
    UpstreamUnreachable(String),

    /// The upstream fetch exceeded the configured timeout.
    #[error("upstream request timed out after {0} seconds")]
    UpstreamTimeout(u64),

    /// Any other outbound transport failure.
    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),

    /// Unhandled internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status code for the user-visible response.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget | ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamTransport(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::MissingTarget => serde_json::json!({
                "error": self.to_string(),
                "usage": USAGE,
            }),
            ProxyError::InvalidUrl(provided) => serde_json::json!({
                "error": "invalid target URL",
                "provided": provided,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
