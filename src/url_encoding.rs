//! Query-string encoding for pooled requests.
//!
//! Keys and values are escaped the way HTML form encoding does it, with `+`
//! for spaces, and pairs are emitted sorted by key.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except the RFC 3986 unreserved set. Space is handled by
/// [`query_escape`] directly.
const QUERY_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escape a single query component, mapping spaces to `+`.
pub(crate) fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, chunk) in s.split(' ').enumerate() {
        if i > 0 {
            out.push('+');
        }
        out.extend(utf8_percent_encode(chunk, QUERY_ESCAPE_SET));
    }
    out
}

fn query_unescape(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Parse a raw query string into ordered multi-valued pairs.
pub(crate) fn parse_query(raw: &str) -> BTreeMap<String, Vec<String>> {
    let mut pairs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for part in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        pairs
            .entry(query_unescape(key))
            .or_default()
            .push(query_unescape(value));
    }
    pairs
}

/// Render pairs as `k=v&k2=v2`, sorted by key.
pub(crate) fn encode_query(pairs: &BTreeMap<String, Vec<String>>) -> String {
    let mut out = String::new();
    for (key, values) in pairs {
        let key = query_escape(key);
        for value in values {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&key);
            out.push('=');
            out.push_str(&query_escape(value));
        }
    }
    out
}
