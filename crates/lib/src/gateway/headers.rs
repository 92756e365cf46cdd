//! Inbound -> outbound header whitelist for forwarded requests.

use axum::http::{header, HeaderMap, HeaderValue};

/// Headers relayed to the backend: `authorization`, `cookie`, and `content-type` unless it is
/// multipart (multipart bodies are re-encoded, so their boundary no longer applies).
/// Empty values are dropped.
pub fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    if let Some(v) = non_empty(inbound.get(header::AUTHORIZATION)) {
        out.insert(header::AUTHORIZATION, v.clone());
    }
    for v in inbound.get_all(header::COOKIE) {
        if let Some(v) = non_empty(Some(v)) {
            out.append(header::COOKIE, v.clone());
        }
    }
    if let Some(ct) = non_empty(inbound.get(header::CONTENT_TYPE)) {
        if !is_multipart(ct) {
            out.insert(header::CONTENT_TYPE, ct.clone());
        }
    }
    out
}

fn non_empty(v: Option<&HeaderValue>) -> Option<&HeaderValue> {
    v.filter(|v| !v.is_empty())
}

fn is_multipart(ct: &HeaderValue) -> bool {
    ct.to_str()
        .map(|s| s.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false)
}
