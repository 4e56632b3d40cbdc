//! In-memory [`ObjectStore`] used by tests.

use super::{ObjectStore, StoreError, StoreResult, ensure_key_safe, ensure_prefix, join_url};
use crate::models::{
    object::{ObjectMeta, StoredObject},
    upload::PresignedPut,
};
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

pub const PUBLIC_BASE: &str = "https://pub-test.r2.dev";

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    /// When set, every call fails with this backend message.
    failure: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            objects: RwLock::default(),
            failure: Some(message.to_string()),
        }
    }

    pub async fn insert(&self, key: &str, body: &'static [u8], content_type: Option<&str>) {
        let object = StoredObject {
            body: Bytes::from_static(body),
            content_type: content_type.map(str::to_string),
            etag: Some(format!("{:x}", md5::compute(body))),
            last_modified: Some(Utc::now()),
        };
        self.objects.write().await.insert(key.to_string(), object);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    fn check(&self) -> StoreResult<()> {
        match &self.failure {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        self.check()?;
        ensure_key_safe(key)?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StoreResult<()> {
        self.check()?;
        ensure_key_safe(key)?;
        let object = StoredObject {
            etag: Some(format!("{:x}", md5::compute(&body))),
            body,
            content_type: Some(content_type.to_string()),
            last_modified: Some(Utc::now()),
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.check()?;
        ensure_prefix(prefix)?;
        let objects = self.objects.read().await;
        let mut listed = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectMeta {
                key: key.clone(),
                size: obj.body.len() as i64,
                last_modified: obj.last_modified.unwrap_or_default(),
                etag: obj.etag.clone(),
            })
            .collect::<Vec<_>>();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        ensure_key_safe(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(PUBLIC_BASE, key)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        expiry_secs: u32,
    ) -> StoreResult<PresignedPut> {
        self.check()?;
        ensure_key_safe(key)?;
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        if let Some(len) = content_length {
            headers.insert("Content-Length".to_string(), len.to_string());
        }
        headers.insert("x-amz-date".to_string(), "20260101T000000Z".to_string());
        Ok(PresignedPut {
            url: format!(
                "https://acct.r2.cloudflarestorage.com/bucket/{}?X-Amz-Expires={}&X-Amz-Signature=fake",
                key, expiry_secs
            ),
            headers,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}
