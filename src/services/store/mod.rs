//! Object access façade.
//!
//! Every backend implements [`ObjectStore`]; handlers only ever see
//! `Arc<dyn ObjectStore>`. Adapters are stateless apart from their client
//! handles, so one instance is shared by all requests.

use crate::models::{
    object::{ObjectMeta, StoredObject},
    upload::PresignedPut,
};
use bytes::Bytes;
use std::io;
use thiserror::Error;

pub mod local;
#[cfg(test)]
pub mod memory;
pub mod r2;

pub use local::LocalStore;
pub use r2::R2Store;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key")]
    InvalidKey,
    #[error("listing prefix `{0}` must end with `/`")]
    InvalidPrefix(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. `Ok(None)` means the store reported it missing.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Write `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StoreResult<()>;

    /// List every object under `prefix`, which must end with `/`.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Public URL for `key`. Pure string derivation, no I/O.
    fn public_url(&self, key: &str) -> String;

    /// Presigned PUT for a direct client upload. The content type, and the
    /// length when known, are bound into the grant.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        expiry_secs: u32,
    ) -> StoreResult<PresignedPut>;

    /// Cheap connectivity check used by `/readyz`.
    async fn ping(&self) -> StoreResult<()>;
}

/// Reject keys that could escape the bucket namespace.
///
/// Empty keys, a leading `/`, `.` or `..` segments, backslashes and
/// control bytes are refused. Dots inside a segment (`report..v2.pdf`) are fine.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StoreError::InvalidKey);
    }
    if key.starts_with('/') || has_dot_segment(key) {
        return Err(StoreError::InvalidKey);
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| segment == "." || segment == "..")
}

pub fn ensure_prefix(prefix: &str) -> StoreResult<()> {
    if !prefix.ends_with('/') || prefix.starts_with('/') || has_dot_segment(prefix) {
        return Err(StoreError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Join a base URL and an object key with exactly one slash between them.
pub fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}
