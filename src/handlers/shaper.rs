//! Turns a fetched object into the HTTP response served by the access routes.

use crate::{
    errors::AppError, models::object::StoredObject, services::signed_url_service::encode_component,
};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use percent_encoding::percent_decode_str;

/// How the browser should present the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Inline,
    Download,
}

impl AccessMode {
    /// Parse the `mode` query parameter; absent means `default`.
    pub fn parse(value: Option<&str>, default: AccessMode) -> Result<Self, AppError> {
        match value.map(str::trim) {
            None | Some("") => Ok(default),
            Some(v) if v.eq_ignore_ascii_case("inline") => Ok(AccessMode::Inline),
            Some(v) if v.eq_ignore_ascii_case("download") => Ok(AccessMode::Download),
            Some(v) => Err(AppError::bad_request(format!(
                "Invalid mode `{}`: expected inline or download",
                v
            ))),
        }
    }

    fn disposition(self) -> &'static str {
        match self {
            AccessMode::Inline => "inline",
            AccessMode::Download => "attachment",
        }
    }
}

/// Per-route response defaults.
#[derive(Clone, Copy, Debug)]
pub struct AccessProfile {
    pub default_content_type: &'static str,
    pub default_mode: AccessMode,
    pub cache_control: Option<&'static str>,
    pub not_found: &'static str,
}

pub const CERTIFICATE: AccessProfile = AccessProfile {
    default_content_type: "image/png",
    default_mode: AccessMode::Inline,
    cache_control: None,
    not_found: "Certificate not found",
};

pub const DOCUMENT: AccessProfile = AccessProfile {
    default_content_type: "application/octet-stream",
    default_mode: AccessMode::Inline,
    cache_control: Some("private, max-age=3600"),
    not_found: "Document not found",
};

pub const PAYMENT_RECEIPT: AccessProfile = AccessProfile {
    default_content_type: "application/pdf",
    default_mode: AccessMode::Download,
    cache_control: None,
    not_found: "Receipt not found",
};

/// URL-decoded final path segment of `key`, safe for a quoted header param.
pub fn filename_from_key(key: &str) -> String {
    let last = key.rsplit('/').next().unwrap_or(key);
    let decoded = percent_decode_str(last).decode_utf8_lossy();
    let cleaned = decoded
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect::<String>();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// `Content-Disposition` value for `filename`.
///
/// Non-ASCII names get an ASCII `filename` fallback plus an RFC 6266
/// `filename*` carrying the UTF-8 name.
pub fn content_disposition(mode: AccessMode, filename: &str) -> String {
    if filename.is_ascii() {
        return format!("{}; filename=\"{}\"", mode.disposition(), filename);
    }
    let fallback = filename
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect::<String>();
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        mode.disposition(),
        fallback,
        encode_component(filename)
    )
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Build the response for a fetched object, or the route's 404.
pub fn shape(
    object: Option<StoredObject>,
    key: &str,
    mode: AccessMode,
    profile: &AccessProfile,
) -> Result<Response, AppError> {
    let object = object.ok_or_else(|| AppError::not_found(profile.not_found))?;

    let content_type = object
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .unwrap_or(profile.default_content_type);
    let length = object.body.len();

    let mut response = Response::new(Body::from(object.body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    insert_str(
        headers,
        header::CONTENT_DISPOSITION,
        &content_disposition(mode, &filename_from_key(key)),
    );

    if let Some(etag) = object.etag.as_deref() {
        insert_str(headers, header::ETAG, &format!("\"{}\"", etag));
    }
    if let Some(last_modified) = object.last_modified {
        insert_str(headers, header::LAST_MODIFIED, &last_modified.to_rfc2822());
    }
    if let Some(cache_control) = profile.cache_control {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    }

    Ok(response)
}
