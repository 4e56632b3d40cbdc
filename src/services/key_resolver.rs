//! Derives object keys from explicit keys or from the URLs clients hold.
//!
//! Clients store whatever URL they were given at upload time: a public R2
//! URL, a proxy URL of this service, or a URL on a custom domain. All of them
//! map back to a key here, without touching the store.

use axum::http::Uri;
use percent_encoding::percent_decode_str;

/// Substrings marking a direct storage-provider URL; the key follows them.
const PROVIDER_MARKERS: [&str; 1] = [".r2.dev/"];

/// Paths of this service's own access routes.
pub const ACCESS_ROUTES: [&str; 3] = ["/document-access", "/course-certificate", "/payment-receipt"];

/// Path segments that start a key on custom-domain URLs.
const SEGMENT_MARKERS: [&str; 2] = ["/teachers/", "/students/"];

/// Proxy URLs wrapping proxy URLs are followed at most this deep.
const MAX_PROXY_DEPTH: usize = 4;

/// Resolve a storage key.
///
/// A non-empty explicit key always wins. Otherwise the URL is tried against
/// provider URLs, proxy URLs, known path segments and finally a bare
/// custom-domain path. Returns `None` when no key can be determined.
pub fn resolve_key(explicit_key: Option<&str>, url: Option<&str>) -> Option<String> {
    if let Some(key) = explicit_key.filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }
    url.and_then(|u| key_from_url(u, 0))
}

fn key_from_url(url: &str, depth: usize) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || depth > MAX_PROXY_DEPTH {
        return None;
    }

    for marker in PROVIDER_MARKERS {
        if let Some((_, rest)) = url.split_once(marker) {
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }

    let uri: Uri = url.parse().ok()?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return None;
    }
    let path = uri.path();

    if is_access_route(path) {
        let query = uri.query().unwrap_or("");
        if let Some(key) = query_param(query, "key").filter(|k| !k.is_empty()) {
            return Some(key);
        }
        return query_param(query, "url").and_then(|inner| key_from_url(&inner, depth + 1));
    }

    let decoded = percent_decode_str(path).decode_utf8_lossy();

    for marker in SEGMENT_MARKERS {
        if let Some(pos) = decoded.find(marker) {
            return Some(decoded[pos + 1..].to_string());
        }
    }

    let key = decoded.trim_start_matches('/');
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn is_access_route(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    ACCESS_ROUTES.iter().any(|route| path.ends_with(route))
}

/// First value of `name` in a query string, form-decoded.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode(k) == name).then(|| form_decode(v))
        })
        .next()
}

fn form_decode(value: &str) -> String {
    percent_decode_str(&value.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
