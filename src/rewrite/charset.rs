//! Character-set detection and decoding for text payloads.

use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;

/// How far into an HTML body the `<meta>` sniff looks.
const META_SNIFF_WINDOW: usize = 1024;

/// Covers `<meta charset="X">` and
/// `<meta http-equiv="Content-Type" content="...; charset=X">`.
static META_CHARSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9._:-]+)"#)
        .expect("valid meta charset regex")
});

/// Decode a text body to a UTF-8 string, never failing.
pub fn decode_body(body: &[u8], content_type: &str) -> String {
    let encoding = select_encoding(body, content_type);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

/// Pick the decoder: Content-Type parameter first, then an HTML meta sniff,
/// then UTF-8. Unknown labels also fall back to UTF-8 rather than failing.
pub fn select_encoding(body: &[u8], content_type: &str) -> &'static Encoding {
    let label = charset_param(content_type).or_else(|| {
        content_type
            .to_ascii_lowercase()
            .contains("text/html")
            .then(|| sniff_meta_charset(body))
            .flatten()
    });

    label
        .and_then(|raw| Encoding::for_label(normalize_label(&raw).as_bytes()))
        .unwrap_or(UTF_8)
}

fn charset_param(content_type: &str) -> Option<String> {
    for part in content_type.split(';').skip(1) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("charset") {
            continue;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'');
        if !label.is_empty() {
            return Some(label.to_owned());
        }
    }
    None
}

fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let window = &body[..body.len().min(META_SNIFF_WINDOW)];
    let prefix = String::from_utf8_lossy(window);
    META_CHARSET_RE
        .captures(&prefix)
        .map(|caps| caps[1].to_owned())
}

/// Lowercase, underscores to hyphens, plus the legacy alias table.
fn normalize_label(label: &str) -> String {
    let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "iso-8859-1" | "iso8859-1" => "latin1".to_owned(),
        "windows-1252" => "cp1252".to_owned(),
        "utf8" => "utf-8".to_owned(),
        _ => normalized,
    }
}
