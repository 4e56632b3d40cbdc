//! Text extraction for lesson resources.
//!
//! Reads each resource's file from the object store and records its text in
//! the `resources` table. Only text-like content types are handled; other
//! files are skipped rather than failed.

use crate::{
    errors::AppError,
    models::resource::{ExtractContentRequest, ExtractionResult, Resource},
    services::store::ObjectStore,
};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, error, warn};

pub const MAX_EXTRACTED_CHARS: usize = 100_000;

const TEXT_CONTENT_TYPES: [&str; 2] = ["application/json", "application/xml"];

pub fn is_text_like(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || TEXT_CONTENT_TYPES.contains(&essence.as_str())
}

async fn selected_ids(db: &SqlitePool, req: ExtractContentRequest) -> Result<Vec<String>, AppError> {
    if let Some(id) = req.resource_id.filter(|id| !id.trim().is_empty()) {
        return Ok(vec![id]);
    }
    if let Some(ids) = req.resource_ids.filter(|ids| !ids.is_empty()) {
        return Ok(ids);
    }
    if let Some(lesson_id) = req.lesson_id.filter(|id| !id.trim().is_empty()) {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT resource_id FROM resources WHERE lesson_id = ? ORDER BY resource_id",
        )
        .bind(&lesson_id)
        .fetch_all(db)
        .await?;
        return Ok(ids);
    }

    let mut err = AppError::bad_request("resourceId, resourceIds or lessonId is required");
    err.required = Some(vec![
        "resourceId".to_string(),
        "resourceIds".to_string(),
        "lessonId".to_string(),
    ]);
    Err(err)
}

async fn extract_one(
    db: &SqlitePool,
    store: &dyn ObjectStore,
    resource_id: &str,
) -> Result<ExtractionResult, AppError> {
    let resource = sqlx::query_as::<_, Resource>(
        "SELECT resource_id, lesson_id, file_key, content_type, extracted_text, extracted_at
         FROM resources WHERE resource_id = ?",
    )
    .bind(resource_id)
    .fetch_optional(db)
    .await?;

    let Some(resource) = resource else {
        return Ok(ExtractionResult::failed(resource_id, "Resource not found"));
    };
    if resource.extracted_text.is_some() {
        return Ok(ExtractionResult::skipped(resource_id, "Content already extracted"));
    }
    let Some(file_key) = resource.file_key.filter(|k| !k.is_empty()) else {
        return Ok(ExtractionResult::skipped(resource_id, "Resource has no file"));
    };

    let object = match store.get(&file_key).await {
        Ok(Some(object)) => object,
        Ok(None) => return Ok(ExtractionResult::failed(resource_id, "File not found in storage")),
        Err(err) => {
            warn!(resource_id, file_key = %file_key, error = %err, "fetch for extraction failed");
            return Ok(ExtractionResult::failed(resource_id, err.to_string()));
        }
    };

    let content_type = resource
        .content_type
        .or(object.content_type)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !is_text_like(&content_type) {
        return Ok(ExtractionResult::skipped(
            resource_id,
            format!("Unsupported content type: {}", content_type),
        ));
    }

    let text = String::from_utf8_lossy(&object.body)
        .chars()
        .take(MAX_EXTRACTED_CHARS)
        .collect::<String>();

    sqlx::query("UPDATE resources SET extracted_text = ?, extracted_at = ? WHERE resource_id = ?")
        .bind(&text)
        .bind(Utc::now())
        .bind(resource_id)
        .execute(db)
        .await?;

    debug!(resource_id, chars = text.chars().count(), "extracted resource text");
    Ok(ExtractionResult::success(resource_id))
}

/// Extract every selected resource; failures are reported per resource.
///
/// Only resolving the selection can fail the whole call. A database error
/// on one resource becomes that resource's `error` result.
pub async fn extract_content(
    db: &SqlitePool,
    store: &dyn ObjectStore,
    req: ExtractContentRequest,
) -> Result<Vec<ExtractionResult>, AppError> {
    let ids = selected_ids(db, req).await?;
    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let result = match extract_one(db, store, &id).await {
            Ok(result) => result,
            Err(err) => {
                error!(resource_id = %id, error = %err, "extraction failed");
                ExtractionResult::failed(&id, err.to_string())
            }
        };
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::resource::ExtractionStatus, run_migrations, services::store::memory::MemoryStore,
    };
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn add_resource(db: &SqlitePool, id: &str, lesson: &str, key: Option<&str>, ct: Option<&str>) {
        sqlx::query("INSERT INTO resources (resource_id, lesson_id, file_key, content_type) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(lesson)
            .bind(key)
            .bind(ct)
            .execute(db)
            .await
            .unwrap();
    }

    #[test]
    fn text_like_types() {
        assert!(is_text_like("text/plain; charset=utf-8"));
        assert!(is_text_like("Application/JSON"));
        assert!(!is_text_like("application/pdf"));
    }

    #[tokio::test]
    async fn extracts_by_lesson_with_per_resource_outcomes() {
        let db = pool().await;
        let store = MemoryStore::new();
        store.insert("courses/c1/lessons/l1/notes.txt", b"lesson notes", Some("text/plain")).await;
        store.insert("courses/c1/lessons/l1/slides.pdf", b"%PDF", Some("application/pdf")).await;

        add_resource(&db, "r1", "l1", Some("courses/c1/lessons/l1/notes.txt"), None).await;
        add_resource(&db, "r2", "l1", Some("courses/c1/lessons/l1/slides.pdf"), Some("application/pdf")).await;
        add_resource(&db, "r3", "l1", None, None).await;
        add_resource(&db, "r4", "l1", Some("courses/c1/lessons/l1/gone.txt"), Some("text/plain")).await;

        let req = ExtractContentRequest {
            lesson_id: Some("l1".into()),
            ..Default::default()
        };
        let results = extract_content(&db, &store, req).await.unwrap();
        let statuses = results.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                ExtractionStatus::Success,
                ExtractionStatus::Skipped,
                ExtractionStatus::Skipped,
                ExtractionStatus::Error
            ]
        );
        assert_eq!(results[1].reason.as_deref(), Some("Unsupported content type: application/pdf"));
        assert_eq!(results[3].error.as_deref(), Some("File not found in storage"));

        let text: Option<String> =
            sqlx::query_scalar("SELECT extracted_text FROM resources WHERE resource_id = 'r1'")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(text.as_deref(), Some("lesson notes"));

        let again = extract_content(
            &db,
            &store,
            ExtractContentRequest {
                resource_id: Some("r1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(again[0].status, ExtractionStatus::Skipped);
    }

    #[tokio::test]
    async fn database_failure_on_one_resource_does_not_stop_the_rest() {
        let db = pool().await;
        let store = MemoryStore::new();
        for id in ["r1", "r2", "r3"] {
            let key = format!("courses/c1/lessons/l1/{}.txt", id);
            store.insert(&key, b"text", Some("text/plain")).await;
            add_resource(&db, id, "l1", Some(&key), None).await;
        }
        sqlx::query(
            "CREATE TRIGGER lock_r2 BEFORE UPDATE ON resources WHEN NEW.resource_id = 'r2'
             BEGIN SELECT RAISE(ABORT, 'resource locked'); END",
        )
        .execute(&db)
        .await
        .unwrap();

        let req = ExtractContentRequest {
            lesson_id: Some("l1".into()),
            ..Default::default()
        };
        let results = extract_content(&db, &store, req).await.unwrap();
        let statuses = results.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![ExtractionStatus::Success, ExtractionStatus::Error, ExtractionStatus::Success]
        );
        assert_eq!(results[1].resource_id, "r2");
        assert!(results[1].error.as_deref().unwrap().contains("resource locked"));

        let extracted: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM resources WHERE extracted_text IS NOT NULL")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(extracted, 2);
    }

    #[tokio::test]
    async fn unknown_resources_and_missing_selectors() {
        let db = pool().await;
        let store = MemoryStore::new();

        let results = extract_content(
            &db,
            &store,
            ExtractContentRequest {
                resource_ids: Some(vec!["nope".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results[0].status, ExtractionStatus::Error);
        assert_eq!(results[0].error.as_deref(), Some("Resource not found"));

        let err = extract_content(&db, &store, ExtractContentRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.required.map(|r| r.len()), Some(3));
    }
}
