//! Upload, listing and file-management routes.

use crate::{
    errors::AppError,
    handlers::extract::JsonBody,
    models::{
        object::ListEntry,
        upload::{
            BatchConfirmRequest, BatchUploadGrantRequest, ConfirmUploadRequest,
            PaymentReceiptRequest, UploadGrantRequest,
        },
    },
    services::{
        AppState,
        store::ensure_key_safe,
        upload_service::{
            confirm_upload, confirm_uploads, issue_upload_grant, issue_upload_grants,
            store_payment_receipt,
        },
        validation::validate_id,
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

/// Body of `POST /get-url`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileKeyReq {
    pub file_key: Option<String>,
}

/// Body of `POST /files/delete`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFilesReq {
    pub file_keys: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub file_key: String,
    pub error: String,
}

/// `POST /presigned`
pub async fn presigned_upload(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UploadGrantRequest>,
) -> Result<Json<Value>, AppError> {
    let grant = issue_upload_grant(state.store.as_ref(), &req, &state.settings)
        .await
        .inspect_err(|err| warn!(error = %err, "presigned upload rejected"))?;
    Ok(Json(json!({ "success": true, "data": grant })))
}

/// `POST /confirm`
pub async fn confirm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ConfirmUploadRequest>,
) -> Result<Json<Value>, AppError> {
    let confirmed = confirm_upload(state.store.as_ref(), req)?;
    info!(file_key = %confirmed.key, "upload confirmed");
    Ok(Json(json!({ "success": true, "data": confirmed })))
}

/// `POST /presigned-multiple`
pub async fn presigned_uploads(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BatchUploadGrantRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = issue_upload_grants(state.store.as_ref(), &req, &state.settings)
        .await
        .inspect_err(|err| warn!(error = %err, "batch presigned upload rejected"))?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

/// `POST /confirm-multiple`
pub async fn confirm_multiple(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BatchConfirmRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = confirm_uploads(state.store.as_ref(), &req)?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

/// `POST /upload-payment-receipt`
pub async fn upload_payment_receipt(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PaymentReceiptRequest>,
) -> Result<Json<Value>, AppError> {
    let receipt = store_payment_receipt(state.store.as_ref(), req).await?;
    Ok(Json(json!({
        "success": true,
        "url": receipt.url,
        "fileKey": receipt.file_key,
        "filename": receipt.filename,
    })))
}

/// `POST /get-url` and `POST /get-file-url`
pub async fn get_file_url(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<FileKeyReq>,
) -> Result<Json<Value>, AppError> {
    let key = req
        .file_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("fileKey is required"))?;
    ensure_key_safe(&key)?;
    Ok(Json(json!({ "success": true, "url": state.store.public_url(&key) })))
}

/// `GET /files/{courseId}` and `GET /files/{courseId}/{lessonId}`
pub async fn list_files(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Value>, AppError> {
    let segments = path.trim_end_matches('/').split('/').collect::<Vec<_>>();
    let prefix = match segments.as_slice() {
        [course_id] if !course_id.is_empty() => {
            validate_id("courseId", course_id)?;
            format!("courses/{}/", course_id)
        }
        [course_id, lesson_id] if !course_id.is_empty() && !lesson_id.is_empty() => {
            validate_id("courseId", course_id)?;
            validate_id("lessonId", lesson_id)?;
            format!("courses/{}/lessons/{}/", course_id, lesson_id)
        }
        _ => return Err(AppError::bad_request("courseId and lessonId are required")),
    };

    let objects = state.store.list(&prefix).await.map_err(|err| {
        error!(prefix = %prefix, error = %err, "listing failed");
        AppError::from(err)
    })?;

    let data = objects
        .into_iter()
        .map(|meta| {
            let url = state.store.public_url(&meta.key);
            ListEntry::from_meta(meta, url)
        })
        .collect::<Vec<_>>();

    info!(prefix = %prefix, count = data.len(), "listed files");
    Ok(Json(json!({ "success": true, "data": data })))
}

/// `GET /files/` with no course or lesson.
pub async fn list_files_missing_ids() -> AppError {
    AppError::bad_request("courseId and lessonId are required")
}

/// `DELETE /files/{*key}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    ensure_key_safe(&key)?;
    state.store.delete(&key).await.map_err(|err| {
        error!(key = %key, error = %err, "delete failed");
        AppError::from(err)
    })?;
    info!(key = %key, "file deleted");
    Ok(Json(json!({ "success": true, "message": "File deleted successfully" })))
}

/// `POST /files/delete`. Deletes each key independently.
pub async fn delete_files(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<DeleteFilesReq>,
) -> Result<Json<Value>, AppError> {
    let keys = req
        .file_keys
        .filter(|keys| !keys.is_empty())
        .ok_or_else(|| AppError::bad_request("fileKeys array is required"))?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for key in keys {
        let outcome = match ensure_key_safe(&key) {
            Ok(()) => state.store.delete(&key).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => deleted.push(key),
            Err(err) => {
                warn!(key = %key, error = %err, "batch delete entry failed");
                errors.push(DeleteFailure {
                    file_key: key,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(deleted = deleted.len(), failed = errors.len(), "batch delete finished");
    let mut body = json!({ "success": true, "deleted": deleted });
    if !errors.is_empty() {
        body["errors"] = json!(errors);
    }
    Ok(Json(body))
}
