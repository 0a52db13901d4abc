//! Upstream dispatcher.
//!
//! # Responsibilities
//! - Perform the outbound request: method, sanitized headers, body
//! - Follow redirects up to the configured cap; report the final URL
//! - Decompress gzip/deflate/br inline
//! - Map transport failures onto the proxy error taxonomy
//!
//! # Design Decisions
//! - One shared `reqwest::Client` per process; connections pool across
//!   requests, cookies do not (no cookie store; the browser owns cookie
//!   state)
//! - `Accept-Encoding` is left to reqwest: setting it by hand would turn
//!   off automatic decompression
//! - Bodies forward verbatim with the inbound Content-Type, which keeps
//!   JSON, urlencoded forms, and multipart boundaries byte-exact

use std::time::Duration;

use axum::http::header::{
    ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use reqwest::redirect;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{ProxyError, ProxyResult};

/// A fully buffered upstream response, already decompressed.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// URL after redirects; the base for all content rewriting.
    pub final_url: Url,
    pub body: Bytes,
}

/// Shared outbound HTTP client.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    user_agent: String,
    timeout_secs: u64,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            user_agent: config.user_agent.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Fetch `url` on behalf of the client request described by
    /// (`method`, `inbound`, `body`).
    pub async fn dispatch(
        &self,
        method: Method,
        url: Url,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> ProxyResult<UpstreamResponse> {
        let origin = origin_of(&url);
        let headers = outbound_headers(inbound, &origin, &self.user_agent);

        let mut request = self.http.request(method, url.clone()).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|err| self.classify(err, &url))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.classify(err, &url))?;

        Ok(UpstreamResponse {
            status,
            headers,
            final_url,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error, url: &Url) -> ProxyError {
        if err.is_timeout() {
            return ProxyError::UpstreamTimeout(self.timeout_secs);
        }
        if is_dns_failure(&err) {
            return ProxyError::UpstreamUnreachable(
                url.host_str().unwrap_or_default().to_string(),
            );
        }
        ProxyError::UpstreamTransport(err.to_string())
    }
}

/// `scheme://host[:port]` of the target, for the Referer/Origin headers.
fn origin_of(url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}://{}:{port}", url.scheme(), url.host_str().unwrap_or_default()),
        None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}

/// Assemble the outbound header set from scratch.
///
/// Starting empty (instead of filtering the inbound map) means `Host`,
/// `X-Forwarded-*`, and other proxy metadata can never leak upstream.
fn outbound_headers(inbound: &HeaderMap, origin: &str, user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    for name in [ACCEPT, COOKIE, AUTHORIZATION, CONTENT_TYPE] {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }

    // Claiming the upstream's own origin defeats most referrer checks.
    if let Ok(value) = HeaderValue::from_str(&format!("{origin}/")) {
        headers.insert(REFERER, value);
    }
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ORIGIN, value);
    }

    headers
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns") || text.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}
