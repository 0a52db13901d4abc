//! Encoding of upstream URLs into proxy-local URLs.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// URL prefixes that are never rewritten.
pub const SHORT_CIRCUIT_SCHEMES: &[&str] =
    &["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

/// Matches the path form `/proxy/<scheme>/<authority>[/<rest>]`.
static PATH_FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/proxy/(https?)/([^/]+)(/.*)?$").expect("valid path-form regex"));

/// Scheme + authority of the proxy as seen by the client.
///
/// Derived per request from `X-Forwarded-*` or the `Host` header; every
/// proxy-local URL emitted into rewritten content embeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase {
    scheme: String,
    authority: String,
}

impl ProxyBase {
    pub fn new(scheme: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            authority: authority.into().to_ascii_lowercase(),
        }
    }

    /// `scheme://authority`, no trailing slash.
    pub fn root(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

/// True for references the rewriters must leave untouched.
pub fn is_short_circuit(raw: &str) -> bool {
    raw.is_empty()
        || raw == "#"
        || SHORT_CIRCUIT_SCHEMES
            .iter()
            .any(|scheme| raw.starts_with(scheme))
}

/// `host[:port]` with default ports elided.
pub fn authority_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Encode a reference found in content into a proxy-local URL.
///
/// Relative references are resolved against `base` (the upstream URL of the
/// document being rewritten). Anything unparseable comes back unchanged, as
/// do short-circuit schemes and non-http(s) results.
pub fn encode(raw: &str, base: &Url, proxy: &ProxyBase) -> String {
    if is_short_circuit(raw) {
        return raw.to_string();
    }

    // Scheme-relative references default to https.
    let candidate = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };

    let resolved = match base.join(&candidate) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };
    if !matches!(resolved.scheme(), "http" | "https") || resolved.host_str().is_none() {
        return raw.to_string();
    }

    // An already-proxy-local URL re-resolves to the upstream it names, so a
    // second encode emits the identical string.
    if authority_of(&resolved) == proxy.authority {
        if let Some(mut upstream) = decode_path_form(resolved.path(), resolved.query()) {
            upstream.set_fragment(resolved.fragment());
            return encode_absolute(&upstream, proxy);
        }
    }

    encode_absolute(&resolved, proxy)
}

/// Emit the path form for an absolute upstream URL.
pub fn encode_absolute(upstream: &Url, proxy: &ProxyBase) -> String {
    let mut out = format!(
        "{}/proxy/{}/{}{}",
        proxy.root(),
        upstream.scheme(),
        authority_of(upstream),
        upstream.path(),
    );
    if let Some(query) = upstream.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = upstream.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// True when `path` matches the path form, whether or not it reconstructs.
pub fn is_path_form(path: &str) -> bool {
    PATH_FORM_RE.is_match(path)
}

/// Reconstruct the upstream URL named by a path-form path.
///
/// `raw_query` is appended byte-for-byte so idiosyncratic upstream query
/// matching survives the round trip.
pub fn decode_path_form(path: &str, raw_query: Option<&str>) -> Option<Url> {
    let caps = PATH_FORM_RE.captures(path)?;
    let scheme = caps.get(1)?.as_str();
    let authority = caps.get(2)?.as_str();
    let rest = caps.get(3).map(|m| m.as_str()).unwrap_or("/");

    let mut reconstructed = format!("{scheme}://{authority}{rest}");
    if let Some(query) = raw_query {
        reconstructed.push('?');
        reconstructed.push_str(query);
    }

    Url::parse(&reconstructed)
        .ok()
        .filter(|url| url.host_str().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/dir/page.html").unwrap()
    }

    fn proxy() -> ProxyBase {
        ProxyBase::new("http", "p")
    }

    #[test]
    fn encodes_absolute_and_relative_references() {
        assert_eq!(
            encode("https://other.test/x", &base(), &proxy()),
            "http://p/proxy/https/other.test/x"
        );
        assert_eq!(
            encode("/a", &base(), &proxy()),
            "http://p/proxy/https/example.com/a"
        );
        assert_eq!(
            encode("img.png", &base(), &proxy()),
            "http://p/proxy/https/example.com/dir/img.png"
        );
    }

    #[test]
    fn scheme_relative_defaults_to_https() {
        assert_eq!(
            encode("//cdn.test/lib.js", &base(), &proxy()),
            "http://p/proxy/https/cdn.test/lib.js"
        );
    }

    #[test]
    fn short_circuit_schemes_pass_through() {
        for raw in [
            "",
            "#",
            "data:image/png;base64,AAAA",
            "javascript:void(0)",
            "mailto:a@b.c",
            "tel:+15551234",
            "blob:https://example.com/uuid",
            "about:blank",
        ] {
            assert_eq!(encode(raw, &base(), &proxy()), raw);
        }
    }

    #[test]
    fn non_http_schemes_pass_through() {
        assert_eq!(encode("ftp://files.test/a", &base(), &proxy()), "ftp://files.test/a");
    }

    #[test]
    fn encode_is_idempotent() {
        let once = encode("/a?x=1#frag", &base(), &proxy());
        let twice = encode(&once, &base(), &proxy());
        assert_eq!(once, twice);
    }

    #[test]
    fn path_form_round_trips_exactly() {
        let upstream = Url::parse("https://example.com/page?q=1%202#sec").unwrap();
        let encoded = encode_absolute(&upstream, &proxy());
        assert_eq!(encoded, "http://p/proxy/https/example.com/page?q=1%202#sec");

        let decoded = decode_path_form("/proxy/https/example.com/page", Some("q=1%202")).unwrap();
        assert_eq!(decoded.as_str(), "https://example.com/page?q=1%202");
    }

    #[test]
    fn path_form_supplies_root_path() {
        let decoded = decode_path_form("/proxy/https/example.com", None).unwrap();
        assert_eq!(decoded.as_str(), "https://example.com/");
    }

    #[test]
    fn non_default_port_survives() {
        let upstream = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(
            encode_absolute(&upstream, &proxy()),
            "http://p/proxy/http/example.com:8080/a"
        );
        let decoded = decode_path_form("/proxy/http/example.com:8080/a", None).unwrap();
        assert_eq!(authority_of(&decoded), "example.com:8080");
    }

    #[test]
    fn garbage_is_preserved_verbatim() {
        // Malformed IPv6 authority cannot resolve; the reference is opaque.
        assert_eq!(encode("http://[broken/a", &base(), &proxy()), "http://[broken/a");
    }
}
