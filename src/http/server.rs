//! HTTP server setup and request handling.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeout)
//! - Answer the informational and health endpoints
//! - Resolve each proxy request to its upstream target and dispatch it
//!
//! # Design Decisions
//! - Every proxy-shaped route funnels into one handler that works from the
//!   raw request URI; target resolution is the resolver's job, not the
//!   router's
//! - The fallback route is part of the surface: bare subresource requests
//!   recover their origin from the Referer header

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, HOST,
};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::codec::resolver;
use crate::codec::urls::ProxyBase;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult, USAGE};
use crate::http::pipeline;
use crate::upstream::UpstreamClient;

/// Largest inbound request body the proxy will buffer for forwarding.
const MAX_INBOUND_BODY: usize = 10 * 1024 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub upstream: UpstreamClient,
}

/// HTTP server for the browsing proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let upstream = UpstreamClient::new(&config.upstream)?;
        let state = AppState {
            config: Arc::new(config.clone()),
            upstream,
        };
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        // The layer timeout sits above the upstream timeout so the
        // dispatcher's own error mapping fires first.
        let request_timeout = Duration::from_secs(config.upstream.timeout_secs + 5);

        Router::new()
            .route("/", get(index).options(preflight_handler))
            .route("/health", get(health).options(preflight_handler))
            .route("/proxy", any(proxy_entry))
            .route("/proxy/{*rest}", any(proxy_entry))
            .fallback(proxy_entry)
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream_timeout_secs = self.config.upstream.timeout_secs,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Informational root endpoint.
async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "periscope browsing proxy",
        "usage": USAGE,
    }))
}

/// Liveness endpoint.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Single entry point for every proxy-shaped request: the explicit `/proxy`
/// routes and the Referer-recovery fallback.
async fn proxy_entry(State(state): State<AppState>, request: Request<Body>) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight();
    }

    let explicit_route = request.uri().path().starts_with("/proxy");
    match handle_proxy(state, request).await {
        Ok(response) => response,
        // A stray path with no Referer to recover from is a missing
        // resource, not a malformed proxy call.
        Err(ProxyError::MissingTarget) if !explicit_route => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "not found", "usage": USAGE })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle_proxy(state: AppState, request: Request<Body>) -> ProxyResult<Response> {
    let request_id = Uuid::new_v4();
    let (parts, body) = request.into_parts();

    let path = parts.uri.path().to_string();
    let raw_query = parts.uri.query().map(str::to_string);
    let proxy_base = proxy_base_from(&parts.headers);

    let (target, source) = resolver::resolve_target(&path, raw_query.as_deref(), &parts.headers)?;
    tracing::debug!(
        request_id = %request_id,
        target = %target,
        source = source.as_str(),
        "resolved upstream target"
    );

    let body = to_bytes(body, MAX_INBOUND_BODY)
        .await
        .map_err(|err| ProxyError::Internal(err.to_string()))?;

    let upstream = state
        .upstream
        .dispatch(parts.method, target, &parts.headers, body)
        .await?;

    tracing::info!(
        request_id = %request_id,
        status = upstream.status.as_u16(),
        url = %upstream.final_url,
        "upstream fetch complete"
    );

    Ok(pipeline::assemble(upstream, &proxy_base))
}

/// The proxy base embedded into rewritten content, as the client sees it.
fn proxy_base_from(headers: &HeaderMap) -> ProxyBase {
    let scheme = forwarded_value(headers, "x-forwarded-proto").unwrap_or_else(|| "http".into());
    let authority = forwarded_value(headers, "x-forwarded-host")
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".into());
    ProxyBase::new(scheme, authority)
}

fn forwarded_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next().unwrap_or(value).trim();
    (!first.is_empty()).then(|| first.to_string())
}

async fn preflight_handler() -> Response {
    preflight()
}

/// CORS preflight: permissive across the board.
fn preflight() -> Response {
    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (
                ACCESS_CONTROL_ALLOW_METHODS,
                "GET, POST, PUT, PATCH, DELETE, OPTIONS, HEAD",
            ),
            (ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn proxy_base_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("internal:3001"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("proxy.example"));
        assert_eq!(proxy_base_from(&headers).root(), "https://proxy.example");
    }

    #[test]
    fn proxy_base_falls_back_to_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("internal:3001"));
        assert_eq!(proxy_base_from(&headers).root(), "http://internal:3001");
    }

    #[test]
    fn forwarded_lists_take_the_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-proto",
            HeaderValue::from_static("https, http"),
        );
        assert_eq!(forwarded_value(&headers, "x-forwarded-proto").unwrap(), "https");
    }
}
