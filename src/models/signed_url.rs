//! Proxy access URLs with advisory expiry.

use serde::Serialize;
use std::collections::BTreeMap;

/// A proxy URL for one object.
///
/// Not a cryptographic signature: `expires_at` is informational and nothing
/// in this service enforces it.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub signed_url: String,
    pub expires_at: String,
}

/// Batch form keyed by the URL the client sent.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlBatch {
    pub signed_urls: BTreeMap<String, String>,
    pub expires_at: String,
}
