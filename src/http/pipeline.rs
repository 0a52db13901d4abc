//! Response pipeline: turn an upstream response into the client-facing
//! envelope.
//!
//! # Responsibilities
//! - Copy the status code unchanged
//! - Filter the header blocklist; forward `Set-Cookie` verbatim
//! - Stamp the permissive CORS/frame/referrer headers
//! - Route text bodies through the rewriters
//!
//! Rewriters recover internally (a reference that cannot be processed passes
//! through verbatim), so a rewritten response can degrade but never fail;
//! binary bodies are relayed untouched.

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, LOCATION, REFERRER_POLICY, X_FRAME_OPTIONS,
};
use axum::http::{HeaderMap, HeaderValue, Response};
use bytes::Bytes;

use crate::codec::urls::{self, ProxyBase};
use crate::rewrite::{charset, css, html};
use crate::upstream::UpstreamResponse;

/// Never copied into the outgoing envelope. CSP and frame restrictions would
/// stop rewritten pages from rendering; the encoding/length headers describe
/// a body that no longer exists.
const STRIPPED_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "referrer-policy",
    "content-encoding",
    "transfer-encoding",
    "content-length",
    "connection",
];

/// Assemble the final client response.
pub fn assemble(upstream: UpstreamResponse, proxy: &ProxyBase) -> Response<Body> {
    let content_type = upstream
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut headers = HeaderMap::new();
    for (name, value) in &upstream.headers {
        if is_stripped(name.as_str()) {
            continue;
        }
        // append, not insert: Set-Cookie and friends are multi-valued.
        headers.append(name.clone(), value.clone());
    }

    // A redirect the dispatcher did not follow must still land in-proxy.
    if let Some(location) = upstream
        .headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
    {
        let rewritten = urls::encode(location, &upstream.final_url, proxy);
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            headers.insert(LOCATION, value);
        }
    }

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("ALLOWALL"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("unsafe-url"));

    let body = rewrite_body(&upstream, &content_type, proxy, &mut headers);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}

fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS
        .iter()
        .any(|stripped| name.eq_ignore_ascii_case(stripped))
}

fn rewrite_body(
    upstream: &UpstreamResponse,
    content_type: &str,
    proxy: &ProxyBase,
    headers: &mut HeaderMap,
) -> Bytes {
    if content_type.contains("text/html") {
        let text = charset::decode_body(&upstream.body, content_type);
        let rewritten = html::rewrite_html(&text, &upstream.final_url, proxy);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Bytes::from(rewritten)
    } else if content_type.contains("text/css") {
        let text = charset::decode_body(&upstream.body, content_type);
        let rewritten = css::rewrite_css(&text, &upstream.final_url, proxy);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/css; charset=utf-8"),
        );
        Bytes::from(rewritten)
    } else {
        // Scripts and JSON pass through untouched; the injected shim handles
        // their URLs at run time. Everything else is opaque.
        upstream.body.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;
    use axum::http::StatusCode;
    use url::Url;

    fn upstream_response(
        status: StatusCode,
        headers: Vec<(&str, &str)>,
        body: &[u8],
    ) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                name.parse::<axum::http::header::HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        UpstreamResponse {
            status,
            headers: map,
            final_url: Url::parse("https://example.com/page").unwrap(),
            body: Bytes::copy_from_slice(body),
        }
    }

    fn proxy() -> ProxyBase {
        ProxyBase::new("http", "p")
    }

    #[test]
    fn blocklisted_headers_never_survive() {
        let upstream = upstream_response(
            StatusCode::OK,
            vec![
                ("content-type", "text/html"),
                ("content-security-policy", "default-src 'none'"),
                ("x-frame-options", "DENY"),
                ("referrer-policy", "no-referrer"),
                ("content-encoding", "gzip"),
                ("transfer-encoding", "chunked"),
                ("x-custom", "kept"),
            ],
            b"<html></html>",
        );
        let response = assemble(upstream, &proxy());
        let headers = response.headers();

        assert!(headers.get("content-security-policy").is_none());
        assert!(headers.get("content-encoding").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        assert_eq!(headers.get(X_FRAME_OPTIONS).unwrap(), "ALLOWALL");
        assert_eq!(headers.get(REFERRER_POLICY).unwrap(), "unsafe-url");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }

    #[test]
    fn set_cookie_passes_verbatim_multivalued() {
        let upstream = upstream_response(
            StatusCode::OK,
            vec![
                ("content-type", "text/plain"),
                ("set-cookie", "sid=abc; Path=/"),
                ("set-cookie", "theme=dark; Path=/; HttpOnly"),
            ],
            b"ok",
        );
        let response = assemble(upstream, &proxy());
        let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["sid=abc; Path=/", "theme=dark; Path=/; HttpOnly"]);
    }

    #[test]
    fn html_bodies_are_rewritten_and_recoded() {
        let upstream = upstream_response(
            StatusCode::OK,
            vec![("content-type", "text/html; charset=iso-8859-1")],
            b"<html><body><a href=\"/a\">caf\xe9</a></body></html>",
        );
        let response = assemble(upstream, &proxy());
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn binary_bodies_pass_through_byte_exact() {
        let payload = [0u8, 159, 146, 150];
        let upstream = upstream_response(
            StatusCode::OK,
            vec![("content-type", "image/png")],
            &payload,
        );
        let response = assemble(upstream, &proxy());
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "image/png"
        );
    }

    #[test]
    fn status_is_copied_unchanged() {
        let upstream =
            upstream_response(StatusCode::IM_A_TEAPOT, vec![("content-type", "text/plain")], b"");
        assert_eq!(assemble(upstream, &proxy()).status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn location_header_is_re_encoded() {
        let upstream = upstream_response(
            StatusCode::FOUND,
            vec![("content-type", "text/plain"), ("location", "/next")],
            b"",
        );
        let response = assemble(upstream, &proxy());
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "http://p/proxy/https/example.com/next"
        );
    }
}
