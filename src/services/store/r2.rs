//! Cloudflare R2 adapter over the S3 API (rust-s3).

use super::{ObjectStore, StoreError, StoreResult, ensure_key_safe, ensure_prefix, join_url};
use crate::models::{
    object::{ObjectMeta, StoredObject},
    upload::PresignedPut,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

/// Connection settings for an R2 bucket.
#[derive(Clone)]
pub struct R2Settings {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Base of public object URLs, e.g. `https://pub-xxxx.r2.dev`.
    pub public_url: String,
}

impl fmt::Debug for R2Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Settings")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("public_url", &self.public_url)
            .finish()
    }
}

pub struct R2Store {
    bucket: s3::Bucket,
    public_url: String,
}

impl R2Store {
    pub fn new(bucket: s3::Bucket, public_url: impl Into<String>) -> Self {
        Self {
            bucket,
            public_url: public_url.into(),
        }
    }

    pub fn endpoint(account_id: &str) -> String {
        format!("https://{}.r2.cloudflarestorage.com", account_id)
    }

    pub fn from_settings(settings: &R2Settings) -> anyhow::Result<Self> {
        let region = s3::Region::Custom {
            region: "auto".to_string(),
            endpoint: Self::endpoint(&settings.account_id),
        };

        let credentials = s3::creds::Credentials::new(
            Some(&settings.access_key_id),
            Some(&settings.secret_access_key),
            None,
            None,
            None,
        )?;

        let bucket = s3::Bucket::new(&settings.bucket_name, region, credentials)?.with_path_style();

        Ok(Self::new(*bucket, settings.public_url.clone()))
    }
}

fn backend(context: &str, err: impl fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {}", context, err))
}

fn unexpected_status(context: &str, status: u16, body: &[u8]) -> StoreError {
    StoreError::Backend(format!(
        "{}: status {} {}",
        context,
        status,
        String::from_utf8_lossy(body).trim()
    ))
}

fn header<'a>(
    headers: &'a std::collections::HashMap<String, String>,
    name: &str,
) -> Option<&'a String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

pub(crate) fn strip_etag_quotes(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}

#[async_trait::async_trait]
impl ObjectStore for R2Store {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        ensure_key_safe(key)?;
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| backend("get_object", e))?;

        let status = response.status_code();
        if status == 404 {
            debug!(key, "object not found in R2");
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            return Err(unexpected_status("get_object", status, response.bytes()));
        }

        let headers = response.headers();
        Ok(Some(StoredObject {
            body: response.bytes().clone(),
            content_type: header(&headers, "content-type").cloned(),
            etag: header(&headers, "etag").map(|v| strip_etag_quotes(v)),
            last_modified: header(&headers, "last-modified")
                .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let response = self
            .bucket
            .put_object_with_content_type(key, &body, content_type)
            .await
            .map_err(|e| backend("put_object", e))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(unexpected_status("put_object", status, response.bytes()));
        }
        debug!(key, size = body.len(), "stored object in R2");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        ensure_prefix(prefix)?;
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(|e| backend("list_objects", e))?;

        let objects = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|obj| ObjectMeta {
                last_modified: DateTime::parse_from_rfc3339(&obj.last_modified)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
                etag: obj.e_tag.as_deref().map(strip_etag_quotes),
                size: obj.size as i64,
                key: obj.key,
            })
            .collect::<Vec<_>>();

        debug!(prefix, count = objects.len(), "listed R2 prefix");
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| backend("delete_object", e))?;

        let status = response.status_code();
        if !(200..300).contains(&status) && status != 404 {
            return Err(unexpected_status("delete_object", status, response.bytes()));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_url, key)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        expiry_secs: u32,
    ) -> StoreResult<PresignedPut> {
        ensure_key_safe(key)?;

        // signed headers: the upload must send exactly these values
        let mut signed = http::HeaderMap::new();
        signed.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_str(content_type).map_err(|e| backend("presign_put", e))?,
        );
        if let Some(len) = content_length {
            signed.insert(http::header::CONTENT_LENGTH, http::HeaderValue::from(len));
        }

        let url = self
            .bucket
            .presign_put(key, expiry_secs, Some(signed), None)
            .await
            .map_err(|e| backend("presign_put", e))?;

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        if let Some(len) = content_length {
            headers.insert("Content-Length".to_string(), len.to_string());
        }
        Ok(PresignedPut { url, headers })
    }

    async fn ping(&self) -> StoreResult<()> {
        let (_, status) = self
            .bucket
            .list_page(String::new(), Some("/".to_string()), None, None, Some(1))
            .await
            .map_err(|e| backend("list_objects", e))?;
        if !(200..300).contains(&status) {
            return Err(StoreError::Backend(format!("list_objects: status {}", status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> R2Store {
        R2Store::from_settings(&R2Settings {
            account_id: "acct".into(),
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "secret".into(),
            bucket_name: "skill-echosystem".into(),
            public_url: "https://pub-abc.r2.dev/".into(),
        })
        .unwrap()
    }

    #[test]
    fn public_url_joins_base_and_key() {
        assert_eq!(
            store().public_url("courses/c1/lessons/l1/1-ab.pdf"),
            "https://pub-abc.r2.dev/courses/c1/lessons/l1/1-ab.pdf"
        );
    }

    #[test]
    fn endpoint_uses_account_host() {
        assert_eq!(R2Store::endpoint("acct"), "https://acct.r2.cloudflarestorage.com");
    }

    fn signed_headers(url: &str) -> String {
        let raw = url
            .split_once("X-Amz-SignedHeaders=")
            .map(|(_, rest)| rest.split('&').next().unwrap_or_default())
            .unwrap_or_default();
        percent_encoding::percent_decode_str(raw)
            .decode_utf8_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn presign_put_carries_content_type_and_signature() {
        let grant = store()
            .presign_put("courses/c1/lessons/l1/1-ab.pdf", "application/pdf", None, 3600)
            .await
            .unwrap();
        assert!(grant.url.starts_with("https://acct.r2.cloudflarestorage.com/"));
        assert!(grant.url.contains("/skill-echosystem/courses/c1/lessons/l1/1-ab.pdf?"));
        assert!(grant.url.contains("X-Amz-Signature="));
        assert!(grant.url.contains("X-Amz-Expires=3600"));
        assert_eq!(grant.headers.get("Content-Type").map(String::as_str), Some("application/pdf"));
        assert!(!grant.headers.contains_key("Content-Length"));

        let signed = signed_headers(&grant.url);
        assert!(signed.split(';').any(|h| h == "content-type"), "signed: {signed}");
        assert!(!signed.split(';').any(|h| h == "content-length"), "signed: {signed}");
    }

    #[tokio::test]
    async fn presign_put_signs_known_length() {
        let grant = store()
            .presign_put("courses/c1/lessons/l1/1-ab.pdf", "application/pdf", Some(2048), 600)
            .await
            .unwrap();
        assert_eq!(grant.headers.get("Content-Length").map(String::as_str), Some("2048"));

        let signed = signed_headers(&grant.url);
        let names = signed.split(';').collect::<Vec<_>>();
        assert_eq!(names, ["content-length", "content-type", "host"]);
    }

    #[tokio::test]
    async fn presign_put_rejects_unencodable_content_type() {
        let err = store()
            .presign_put("a/b.pdf", "text/plain\nx", None, 60)
            .await;
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }

    #[test]
    fn debug_output_hides_secret() {
        let settings = R2Settings {
            account_id: "acct".into(),
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "super-secret".into(),
            bucket_name: "b".into(),
            public_url: "https://pub-abc.r2.dev".into(),
        };
        assert!(!format!("{:?}", settings).contains("super-secret"));
    }

    #[test]
    fn etag_quotes_are_stripped() {
        assert_eq!(strip_etag_quotes("\"abc\""), "abc");
        assert_eq!(strip_etag_quotes("abc"), "abc");
    }
}
