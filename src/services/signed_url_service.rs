//! Proxy access URLs for stored objects.
//!
//! A "signed" URL here is this service's `/document-access` route carrying
//! the key, plus an expiry timestamp returned alongside it. Nothing verifies
//! that timestamp when the URL is later fetched.

use crate::{
    errors::AppError,
    models::signed_url::{SignedUrl, SignedUrlBatch},
    services::key_resolver::resolve_key,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_EXPIRES_IN: i64 = 3600;
pub const MAX_EXPIRES_IN: i64 = 7 * 24 * 3600;
pub const MAX_BATCH_URLS: usize = 100;

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// `{api_base}/document-access?key={key}&mode=inline`.
pub fn proxy_url(api_base_url: &str, key: &str) -> String {
    format!(
        "{}/document-access?key={}&mode=inline",
        api_base_url.trim_end_matches('/'),
        encode_component(key)
    )
}

/// Validate `expiresIn`, a number or numeric string, defaulting to one hour.
pub fn expires_in_secs(requested: Option<&Value>) -> Result<i64, AppError> {
    let secs = match requested {
        None | Some(Value::Null) => return Ok(DEFAULT_EXPIRES_IN),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| AppError::bad_request("expiresIn must be a whole number of seconds"))?;

    if (1..=MAX_EXPIRES_IN).contains(&secs) {
        Ok(secs)
    } else {
        Err(AppError::bad_request(format!(
            "expiresIn must be between 1 and {} seconds",
            MAX_EXPIRES_IN
        )))
    }
}

pub fn expires_at(now: DateTime<Utc>, expires_in: i64) -> String {
    (now + Duration::seconds(expires_in)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn issue_signed_url(
    file_key: Option<&str>,
    url: Option<&str>,
    expires_in: Option<&Value>,
    now: DateTime<Utc>,
    api_base_url: &str,
) -> Result<SignedUrl, AppError> {
    let has_key = file_key.is_some_and(|k| !k.is_empty());
    let has_url = url.is_some_and(|u| !u.trim().is_empty());
    if !has_key && !has_url {
        return Err(AppError::bad_request("File key or URL is required"));
    }

    let expires_in = expires_in_secs(expires_in)?;
    let key = resolve_key(file_key, url)
        .ok_or_else(|| AppError::bad_request("Could not determine file key from URL"))?;

    Ok(SignedUrl {
        signed_url: proxy_url(api_base_url, &key),
        expires_at: expires_at(now, expires_in),
    })
}

/// Batch form. Each entry degrades to its original URL when no key can be
/// resolved from it; only the shape of `urls` itself can fail the request.
pub fn issue_signed_urls(
    urls: Option<&Value>,
    expires_in: Option<&Value>,
    now: DateTime<Utc>,
    api_base_url: &str,
) -> Result<SignedUrlBatch, AppError> {
    let urls = match urls {
        None | Some(Value::Null) => return Err(AppError::bad_request("URLs array is required")),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppError::bad_request("URLs must be an array of strings"))?,
        Some(_) => return Err(AppError::bad_request("URLs must be an array")),
    };
    if urls.is_empty() {
        return Err(AppError::bad_request("URLs array cannot be empty"));
    }
    if urls.len() > MAX_BATCH_URLS {
        return Err(AppError::bad_request(format!(
            "Maximum {} URLs allowed per request",
            MAX_BATCH_URLS
        )));
    }
    let expires_in = expires_in_secs(expires_in)?;

    let signed_urls = urls
        .into_iter()
        .map(|original| {
            let signed = match resolve_key(None, Some(original)) {
                Some(key) => proxy_url(api_base_url, &key),
                None => {
                    debug!(url = original, "no key resolvable, echoing original URL");
                    original.to_string()
                }
            };
            (original.to_string(), signed)
        })
        .collect::<BTreeMap<_, _>>();

    Ok(SignedUrlBatch {
        signed_urls,
        expires_at: expires_at(now, expires_in),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://api.example.com/storage";

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("courses/c 1/a(1).pdf"), "courses%2Fc%201%2Fa(1).pdf");
        assert_eq!(encode_component("é"), "%C3%A9");
    }

    #[test]
    fn single_url_defaults_to_one_hour() {
        let now = Utc::now();
        let signed = issue_signed_url(Some("courses/c1/a.pdf"), None, None, now, BASE).unwrap();
        assert_eq!(
            signed.signed_url,
            "https://api.example.com/storage/document-access?key=courses%2Fc1%2Fa.pdf&mode=inline"
        );

        let expires = DateTime::parse_from_rfc3339(&signed.expires_at).unwrap();
        let expected = now + Duration::seconds(3600);
        let drift = (expires.with_timezone(&Utc) - expected).num_milliseconds().abs();
        assert!(drift < 1000, "drift {}ms", drift);
        assert!(signed.expires_at.ends_with('Z'));
    }

    #[test]
    fn single_url_from_public_url() {
        let signed = issue_signed_url(
            None,
            Some("https://pub-1.r2.dev/teachers/degrees/d.pdf"),
            Some(&json!(60)),
            Utc::now(),
            BASE,
        )
        .unwrap();
        assert!(signed.signed_url.ends_with("key=teachers%2Fdegrees%2Fd.pdf&mode=inline"));
    }

    #[test]
    fn single_url_errors() {
        let now = Utc::now();
        assert_eq!(
            issue_signed_url(None, None, None, now, BASE).unwrap_err().message,
            "File key or URL is required"
        );
        assert_eq!(
            issue_signed_url(None, Some("not a valid url"), None, now, BASE)
                .unwrap_err()
                .message,
            "Could not determine file key from URL"
        );
        assert!(issue_signed_url(Some("k"), None, Some(&json!(0)), now, BASE).is_err());
        assert!(issue_signed_url(Some("k"), None, Some(&json!(MAX_EXPIRES_IN + 1)), now, BASE).is_err());
    }

    #[test]
    fn expires_in_accepts_numbers_and_numeric_strings() {
        assert_eq!(expires_in_secs(None).unwrap(), DEFAULT_EXPIRES_IN);
        assert_eq!(expires_in_secs(Some(&Value::Null)).unwrap(), DEFAULT_EXPIRES_IN);
        assert_eq!(expires_in_secs(Some(&json!(120))).unwrap(), 120);
        assert_eq!(expires_in_secs(Some(&json!(120.0))).unwrap(), 120);
        assert_eq!(expires_in_secs(Some(&json!(" 7200 "))).unwrap(), 7200);

        for bad in [json!("soon"), json!(1.5), json!(true), json!([60])] {
            let err = expires_in_secs(Some(&bad)).unwrap_err();
            assert_eq!(err.message, "expiresIn must be a whole number of seconds", "{}", bad);
        }
        let err = expires_in_secs(Some(&json!("0"))).unwrap_err();
        assert!(err.message.starts_with("expiresIn must be between 1 and"));
    }

    #[test]
    fn batch_degrades_per_entry() {
        let urls = json!([
            "https://pub-1.r2.dev/a/b.pdf",
            "not a valid url",
            "https://files.example.com/",
            "https://api.example.com/document-access?key=x%2Fy.png"
        ]);
        let batch = issue_signed_urls(Some(&urls), None, Utc::now(), BASE).unwrap();

        assert_eq!(batch.signed_urls.len(), 4);
        assert_eq!(
            batch.signed_urls["https://pub-1.r2.dev/a/b.pdf"],
            "https://api.example.com/storage/document-access?key=a%2Fb.pdf&mode=inline"
        );
        assert_eq!(batch.signed_urls["not a valid url"], "not a valid url");
        assert_eq!(batch.signed_urls["https://files.example.com/"], "https://files.example.com/");
        assert!(batch.signed_urls["https://api.example.com/document-access?key=x%2Fy.png"]
            .starts_with("https://api.example.com/storage/document-access?key=x%2Fy.png"));
    }

    #[test]
    fn batch_shape_errors() {
        let now = Utc::now();
        let err = |v: Option<Value>| issue_signed_urls(v.as_ref(), None, now, BASE).unwrap_err().message;
        assert_eq!(err(None), "URLs array is required");
        assert_eq!(err(Some(json!("https://a"))), "URLs must be an array");
        assert_eq!(err(Some(json!([]))), "URLs array cannot be empty");
        assert_eq!(err(Some(json!([1, 2]))), "URLs must be an array of strings");
        let too_many = Value::Array(vec![json!("https://a/b"); MAX_BATCH_URLS + 1]);
        assert_eq!(err(Some(too_many)), "Maximum 100 URLs allowed per request");
    }
}
