//! Represents objects as seen through the object store.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A fetched object: payload plus the headers the store reported.
///
/// The payload is owned by the store; handlers only hold it for the
/// duration of a single response.
#[derive(Clone, Debug)]
pub struct StoredObject {
    /// Raw object bytes.
    pub body: Bytes,

    /// Content type (MIME type) recorded by the store, if any.
    pub content_type: Option<String>,

    /// Entity tag as reported by the store, without surrounding quotes.
    pub etag: Option<String>,

    /// Timestamp when the object was last modified.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A single row of a store listing.
#[derive(Clone, FromRow, Debug, PartialEq)]
pub struct ObjectMeta {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: i64,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,

    /// Entity tag without quotes.
    pub etag: Option<String>,
}

/// Listing entry returned by `GET /files/{courseId}[/{lessonId}]`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub key: String,
    pub url: String,
    /// Rendered as a decimal string.
    pub size: String,
    pub last_modified: String,
    pub etag: String,
}

impl ListEntry {
    pub fn from_meta(meta: ObjectMeta, url: String) -> Self {
        Self {
            url,
            size: meta.size.to_string(),
            last_modified: meta
                .last_modified
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            etag: meta.etag.unwrap_or_default(),
            key: meta.key,
        }
    }
}
