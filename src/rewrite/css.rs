//! Stylesheet reference rewriting.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::codec::urls::{self, ProxyBase};

/// `url( [quote] X [quote] )`, case-insensitive and whitespace-tolerant.
static CSS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?P<q>["']?)(?P<target>[^"'()]+?)["']?\s*\)"#)
        .expect("valid CSS url regex")
});

/// `@import "X"` without the url() wrapper.
static CSS_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s+(?P<q>["'])(?P<target>[^"']+)["']"#)
        .expect("valid CSS import regex")
});

/// Rewrite every `url(...)` and `@import` reference through the proxy,
/// preserving the original quoting style. Unresolvable references are left
/// verbatim.
pub fn rewrite_css(css: &str, base: &Url, proxy: &ProxyBase) -> String {
    let pass = CSS_URL_RE.replace_all(css, |caps: &Captures| {
        let quote = &caps["q"];
        let target = caps["target"].trim();
        let rewritten = urls::encode(target, base, proxy);
        format!("url({quote}{rewritten}{quote})")
    });

    CSS_IMPORT_RE
        .replace_all(&pass, |caps: &Captures| {
            let quote = &caps["q"];
            let target = caps["target"].trim();
            let rewritten = urls::encode(target, base, proxy);
            format!("@import {quote}{rewritten}{quote}")
        })
        .into_owned()
}
