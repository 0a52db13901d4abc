//! Resolution of inbound requests to upstream URLs.
//!
//! Three mechanisms, tried in order: the self-describing path form, the
//! `url=` query form, and recovery from a proxy-local `Referer`. The Referer
//! fallback exists for requests whose paths happen not to begin with
//! `/proxy/`; it splices the current path+query onto the referent's origin,
//! which can misroute when the current path collides with a real proxy
//! route. That hazard is inherited behavior.

use axum::http::header::REFERER;
use axum::http::HeaderMap;
use url::Url;

use crate::codec::urls;
use crate::error::{ProxyError, ProxyResult};

/// Which mechanism produced the upstream URL; recorded in request spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    PathForm,
    QueryParam,
    Referer,
}

impl TargetSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetSource::PathForm => "path",
            TargetSource::QueryParam => "query",
            TargetSource::Referer => "referer",
        }
    }
}

/// Map an inbound request to the upstream URL it names.
pub fn resolve_target(
    path: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> ProxyResult<(Url, TargetSource)> {
    if urls::is_path_form(path) {
        let url = urls::decode_path_form(path, raw_query)
            .ok_or_else(|| ProxyError::InvalidUrl(path.to_string()))?;
        return Ok((url, TargetSource::PathForm));
    }

    if let Some(query) = raw_query {
        if let Some(candidate) = target_from_query(query) {
            let url = parse_absolute(&candidate)?;
            return Ok((url, TargetSource::QueryParam));
        }
    }

    if let Some(base) = referer_target(headers) {
        let mut spliced = format!("{}://{}{}", base.scheme(), urls::authority_of(&base), path);
        if let Some(query) = raw_query {
            spliced.push('?');
            spliced.push_str(query);
        }
        let url = parse_absolute(&spliced)?;
        return Ok((url, TargetSource::Referer));
    }

    Err(ProxyError::MissingTarget)
}

/// Extract the `url=` value from a raw query string.
///
/// Percent-decodes once, tolerating input that was never encoded. A raw
/// value may have been split at its own `&`, so for values that carry no
/// percent-encoding the remainder of the query after `url=` is preferred
/// when it parses.
fn target_from_query(raw_query: &str) -> Option<String> {
    let pair_value = raw_query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "url").then_some(value)
    })?;

    if !pair_value.contains('%') {
        let tail_start = if raw_query.starts_with("url=") {
            Some("url=".len())
        } else {
            raw_query.find("&url=").map(|i| i + "&url=".len())
        };
        if let Some(start) = tail_start {
            let tail = &raw_query[start..];
            if tail != pair_value && parse_absolute(tail).is_ok() {
                return Some(tail.to_string());
            }
        }
    }

    Some(decode_once(pair_value))
}

fn decode_once(value: &str) -> String {
    match urlencoding::decode(value) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}

fn parse_absolute(candidate: &str) -> ProxyResult<Url> {
    let url =
        Url::parse(candidate).map_err(|_| ProxyError::InvalidUrl(candidate.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProxyError::InvalidUrl(candidate.to_string()));
    }
    Ok(url)
}

/// Decode a proxy-local Referer (either form) to the upstream URL it names.
fn referer_target(headers: &HeaderMap) -> Option<Url> {
    let referer = headers.get(REFERER)?.to_str().ok()?;
    let parsed = Url::parse(referer).ok()?;

    if let Some(url) = urls::decode_path_form(parsed.path(), parsed.query()) {
        return Some(url);
    }
    if let Some(query) = parsed.query() {
        if let Some(candidate) = target_from_query(query) {
            return parse_absolute(&candidate).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn no_headers() -> HeaderMap {
        HeaderMap::new()
    }

    fn referer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn path_form_preserves_raw_query_bytes() {
        let (url, source) =
            resolve_target("/proxy/https/example.com/page", Some("q=1%202"), &no_headers())
                .unwrap();
        assert_eq!(url.as_str(), "https://example.com/page?q=1%202");
        assert_eq!(source, TargetSource::PathForm);
    }

    #[test]
    fn path_form_without_path_hits_root() {
        let (url, _) = resolve_target("/proxy/http/example.com", None, &no_headers()).unwrap();
        assert_eq!(url.as_str(), "http://example.com/");
    }

    #[test]
    fn query_form_decodes_once() {
        let (url, source) = resolve_target(
            "/proxy",
            Some("url=https%3A%2F%2Fexample.com%2Fa%3Fx%3D1"),
            &no_headers(),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?x=1");
        assert_eq!(source, TargetSource::QueryParam);
    }

    #[test]
    fn query_form_tolerates_unencoded_input() {
        // An unencoded target with its own query: the `&` splits the pair,
        // so resolution must fall back to the query tail.
        let (url, _) = resolve_target(
            "/proxy",
            Some("url=https://example.com/a?x=1&y=2"),
            &no_headers(),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?x=1&y=2");
    }

    #[test]
    fn referer_fallback_splices_current_path() {
        let headers = referer("http://p/proxy/https/example.com/page");
        let (url, source) =
            resolve_target("/css/site.css", Some("v=3"), &headers).unwrap();
        assert_eq!(url.as_str(), "https://example.com/css/site.css?v=3");
        assert_eq!(source, TargetSource::Referer);
    }

    #[test]
    fn referer_fallback_accepts_query_form_referer() {
        let headers = referer("http://p/proxy?url=https%3A%2F%2Fexample.com%2Fpage");
        let (url, _) = resolve_target("/img/logo.png", None, &headers).unwrap();
        assert_eq!(url.as_str(), "https://example.com/img/logo.png");
    }

    #[test]
    fn missing_target_without_any_mechanism() {
        let err = resolve_target("/css/site.css", None, &no_headers()).unwrap_err();
        assert!(matches!(err, ProxyError::MissingTarget));
    }

    #[test]
    fn invalid_candidate_is_reported() {
        let err =
            resolve_target("/proxy", Some("url=notaurl"), &no_headers()).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidUrl(provided) if provided == "notaurl"));
    }

    #[test]
    fn non_proxy_referer_does_not_resolve() {
        let headers = referer("https://unrelated.test/page");
        let err = resolve_target("/asset.js", None, &headers).unwrap_err();
        assert!(matches!(err, ProxyError::MissingTarget));
    }
}
