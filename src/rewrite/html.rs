//! HTML rewriting: attribute re-addressing, hostile-meta removal, and head
//! injection.
//!
//! # Design Decisions
//! - Text-scanning rewriter, not a DOM round-trip: bytes the passes do not
//!   touch stay byte-identical, and a malformed document can never fail to
//!   serialize
//! - The injected referrer meta, `<base>`, and shim are prepended to
//!   `<head>` so the browser parses them before anything else
//! - The shim's marker attribute makes a second rewrite a no-op

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::codec::urls::{self, ProxyBase};
use crate::rewrite::shim;

/// Quoted URL-bearing attributes, both quote styles.
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?P<attr>srcset|src|href|action|data-src|data-url)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#,
    )
    .expect("valid attribute regex")
});

/// Head elements that would fight the proxy: CSP/XFO metas and referrer
/// policies.
static META_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta\s[^>]*(?:http-equiv\s*=\s*["'](?:content-security-policy|x-frame-options)["']|name\s*=\s*["']referrer["'])[^>]*>"#,
    )
    .expect("valid meta strip regex")
});

static HEAD_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head\b[^>]*>").expect("valid head regex"));
static HTML_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html\b[^>]*>").expect("valid html regex"));
static DOCTYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!doctype[^>]*>").expect("valid doctype regex"));

/// Rewrite a full HTML document for serving through the proxy.
///
/// Passes run in order: attribute re-addressing, hostile-meta removal, head
/// injection. A document that already carries the shim marker only gets the
/// (idempotent) attribute pass.
pub fn rewrite_html(html: &str, upstream: &Url, proxy: &ProxyBase) -> String {
    let output = rewrite_attributes(html, upstream, proxy);
    if output.contains(shim::MARKER_ATTR) {
        return output;
    }
    let output = META_STRIP_RE.replace_all(&output, "").into_owned();
    inject_head(output, &head_block(upstream, proxy))
}

fn rewrite_attributes(html: &str, upstream: &Url, proxy: &ProxyBase) -> String {
    ATTR_RE
        .replace_all(html, |caps: &Captures| {
            let attr = &caps["attr"];
            let (quote, value) = match (caps.name("dq"), caps.name("sq")) {
                (Some(value), _) => ('"', value.as_str()),
                (_, Some(value)) => ('\'', value.as_str()),
                _ => return caps[0].to_string(),
            };
            let rewritten = if attr.eq_ignore_ascii_case("srcset") {
                rewrite_srcset(value, upstream, proxy)
            } else {
                urls::encode(value.trim(), upstream, proxy)
            };
            format!("{attr}={quote}{rewritten}{quote}")
        })
        .into_owned()
}

/// Rewrite only the leftmost token of each srcset entry; density and width
/// descriptors stay put.
fn rewrite_srcset(value: &str, upstream: &Url, proxy: &ProxyBase) -> String {
    value
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            let mut parts = entry.splitn(2, char::is_whitespace);
            let candidate = parts.next().unwrap_or_default();
            let descriptor = parts.next().map(str::trim).unwrap_or("");
            let rewritten = urls::encode(candidate, upstream, proxy);
            if descriptor.is_empty() {
                rewritten
            } else {
                format!("{rewritten} {descriptor}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// The referrer meta, the `<base>` anchoring scheme-relative paths under the
/// proxy, and the client shim, in that order.
fn head_block(upstream: &Url, proxy: &ProxyBase) -> String {
    format!(
        r#"<meta name="referrer" content="unsafe-url"><base href="{root}/proxy/{scheme}/{authority}/">{shim}"#,
        root = proxy.root(),
        scheme = upstream.scheme(),
        authority = urls::authority_of(upstream),
        shim = shim::render(proxy, upstream),
    )
}

fn inject_head(html: String, block: &str) -> String {
    let insert_at = HEAD_OPEN_RE
        .find(&html)
        .or_else(|| HTML_OPEN_RE.find(&html))
        .map(|m| m.end())
        .or_else(|| DOCTYPE_RE.find(&html).map(|m| m.end()));

    match insert_at {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..index]);
            out.push_str(block);
            out.push_str(&html[index..]);
            out
        }
        None => format!("{block}{html}"),
    }
}
