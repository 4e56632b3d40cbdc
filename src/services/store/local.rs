//! Development backend keeping object payloads on local disk
//! and their metadata in SQLite.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{key}`. Presigned
//! uploads and public URLs point back at this service's `/local-objects`
//! routes, so a full upload flow works without any cloud account.

use super::{ObjectStore, StoreError, StoreResult, ensure_key_safe, ensure_prefix, join_url};
use crate::models::{
    object::{ObjectMeta, StoredObject},
    upload::PresignedPut,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Route prefix under which the local backend is served.
pub const LOCAL_OBJECTS_ROUTE: &str = "/local-objects";

#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for object metadata.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable base URL of this service.
    pub api_base_url: String,
}

/// Row used when reading a single object's metadata.
#[derive(sqlx::FromRow)]
struct ObjectRow {
    content_type: Option<String>,
    etag: Option<String>,
    last_modified: chrono::DateTime<Utc>,
}

impl LocalStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            api_base_url: api_base_url.into(),
        }
    }

    /// Two-level shard directories from MD5(key), as lowercase hex bytes.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn local_url(&self, key: &str) -> String {
        join_url(&format!("{}{}", self.api_base_url.trim_end_matches('/'), LOCAL_OBJECTS_ROUTE), key)
    }

    /// Stream an upload to disk, then upsert its metadata.
    ///
    /// Bytes go to a temporary file first and are renamed into place once
    /// flushed, so readers never observe a partial payload. Returns the
    /// stored metadata.
    pub async fn upload_stream<S>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<ObjectMeta>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let meta = ObjectMeta {
            key: key.to_string(),
            size,
            last_modified: Utc::now(),
            etag: Some(format!("{:x}", digest.compute())),
        };

        let upsert = sqlx::query(
            r#"
            INSERT INTO objects (key, content_type, size, etag, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size = excluded.size,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(meta.size)
        .bind(&meta.etag)
        .bind(meta.last_modified)
        .execute(&*self.db)
        .await;

        match upsert {
            Ok(_) => Ok(meta),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Remove empty shard directories up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        ensure_key_safe(key)?;
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT content_type, etag, last_modified FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body = match fs::read(self.object_path(key)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(key, "metadata present but payload missing");
                return Ok(None);
            }
            Err(err) => return Err(StoreError::Io(err)),
        };

        Ok(Some(StoredObject {
            body,
            content_type: row.content_type,
            etag: row.etag,
            last_modified: Some(row.last_modified),
        }))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StoreResult<()> {
        let stream = futures::stream::iter([Ok::<_, io::Error>(body)]);
        self.upload_stream(key, Some(content_type.to_string()), stream)
            .await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        ensure_prefix(prefix)?;
        let rows = sqlx::query_as::<_, ObjectMeta>(
            "SELECT key, size, last_modified, etag FROM objects
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC",
        )
        .bind(prefix)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.local_url(key)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        expiry_secs: u32,
    ) -> StoreResult<PresignedPut> {
        ensure_key_safe(key)?;
        let expires = Utc::now() + Duration::seconds(i64::from(expiry_secs));
        let url = format!("{}?expires={}", self.local_url(key), expires.timestamp());

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        if let Some(len) = content_length {
            headers.insert("Content-Length".to_string(), len.to_string());
        }
        Ok(PresignedPut { url, headers })
    }

    async fn ping(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let marker = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&marker, b"readyz").await?;
        fs::remove_file(&marker).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store(dir: &Path) -> LocalStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        LocalStore::new(Arc::new(pool), dir, "http://localhost:3001/")
    }

    #[tokio::test]
    async fn put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        store
            .put("courses/c1/lessons/l1/a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        store
            .put("courses/c1/lessons/l2/b.txt", Bytes::from_static(b"other"), "text/plain")
            .await
            .unwrap();

        let obj = store.get("courses/c1/lessons/l1/a.txt").await.unwrap().unwrap();
        assert_eq!(obj.body.as_ref(), b"hello");
        assert_eq!(obj.content_type.as_deref(), Some("text/plain"));
        assert_eq!(obj.etag.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));

        let listed = store.list("courses/c1/lessons/l1/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "courses/c1/lessons/l1/a.txt");
        assert_eq!(listed[0].size, 5);

        store.delete("courses/c1/lessons/l1/a.txt").await.unwrap();
        assert!(store.get("courses/c1/lessons/l1/a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        store.put("a/b.bin", Bytes::from_static(b"one"), "application/octet-stream").await.unwrap();
        store.put("a/b.bin", Bytes::from_static(b"three"), "application/octet-stream").await.unwrap();

        let obj = store.get("a/b.bin").await.unwrap().unwrap();
        assert_eq!(obj.body.as_ref(), b"three");
        assert_eq!(store.list("a/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn urls_point_at_local_routes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        assert_eq!(store.public_url("a/b.pdf"), "http://localhost:3001/local-objects/a/b.pdf");
        let grant = store.presign_put("a/b.pdf", "application/pdf", Some(12), 60).await.unwrap();
        assert!(grant.url.starts_with("http://localhost:3001/local-objects/a/b.pdf?expires="));
        assert_eq!(grant.headers["Content-Type"], "application/pdf");
        assert_eq!(grant.headers["Content-Length"], "12");
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        assert!(matches!(store.get("../etc/passwd").await, Err(StoreError::InvalidKey)));
        assert!(matches!(store.list("courses").await, Err(StoreError::InvalidPrefix(_))));
    }
}
