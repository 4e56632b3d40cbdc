//! Upload flows: presigned direct uploads, their confirmation, and
//! server-side payment receipt uploads.

use crate::{
    config::ServiceSettings,
    errors::AppError,
    models::upload::{
        BatchConfirmRequest, BatchFailure, BatchFileEntry, BatchOutcome, BatchUploadGrant,
        BatchUploadGrantRequest, ConfirmUploadRequest, ConfirmedUpload, PaymentReceiptRequest,
        StoredReceipt, UploadGrant, UploadGrantRequest,
    },
    services::{
        store::{ObjectStore, ensure_key_safe},
        validation::{
            parse_file_size, require, sanitize_name_segment, validate_content_type, validate_id,
        },
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

const RANDOM_HEX_LEN: usize = 12;
const RECEIPT_CONTENT_TYPE: &str = "application/pdf";
/// Entries accepted by one `POST /presigned-multiple`.
pub const MAX_BATCH_FILES: usize = 10;

/// `{unix-millis}-{random hex}`; keeps keys unique without coordination.
pub fn unique_token(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.timestamp_millis(), &random[..RANDOM_HEX_LEN])
}

/// Lowercase alphanumeric part of the last dot segment of `filename`.
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect::<String>();
    (!ext.is_empty()).then_some(ext)
}

/// `courses/{courseId}/lessons/{lessonId}/{millis}-{hex}[.{ext}]`.
///
/// Both ids must already be validated.
pub fn upload_key(course_id: &str, lesson_id: &str, filename: &str, now: DateTime<Utc>) -> String {
    let mut key = format!(
        "courses/{}/lessons/{}/{}",
        course_id,
        lesson_id,
        unique_token(now)
    );
    if let Some(ext) = file_extension(filename) {
        key.push('.');
        key.push_str(&ext);
    }
    key
}

/// Issue a presigned PUT for one lesson file.
pub async fn issue_upload_grant(
    store: &dyn ObjectStore,
    req: &UploadGrantRequest,
    settings: &ServiceSettings,
) -> Result<UploadGrant, AppError> {
    require(&[
        ("filename", req.filename.as_deref()),
        ("contentType", req.content_type.as_deref()),
        ("courseId", req.course_id.as_deref()),
        ("lessonId", req.lesson_id.as_deref()),
    ])?;
    let (Some(filename), Some(content_type), Some(course_id), Some(lesson_id)) = (
        req.filename.as_deref(),
        req.content_type.as_deref(),
        req.course_id.as_deref(),
        req.lesson_id.as_deref(),
    ) else {
        return Err(AppError::bad_request("Missing required fields"));
    };

    validate_id("courseId", course_id)?;
    validate_id("lessonId", lesson_id)?;
    validate_content_type(content_type)?;
    let file_size = parse_file_size(req.file_size.as_ref(), settings.max_upload_size)?;

    presign_lesson_file(store, settings, course_id, lesson_id, filename, content_type, file_size).await
}

/// Key, presign and log one upload whose inputs are already validated.
async fn presign_lesson_file(
    store: &dyn ObjectStore,
    settings: &ServiceSettings,
    course_id: &str,
    lesson_id: &str,
    filename: &str,
    content_type: &str,
    file_size: Option<u64>,
) -> Result<UploadGrant, AppError> {
    let file_key = upload_key(course_id, lesson_id, filename, Utc::now());
    let presigned = store
        .presign_put(&file_key, content_type, file_size, settings.upload_url_expiry_secs)
        .await?;

    info!(
        file_key = %file_key,
        content_type,
        file_size = file_size.unwrap_or_default(),
        "issued presigned upload"
    );

    Ok(UploadGrant {
        upload_url: presigned.url,
        file_key,
        headers: presigned.headers,
        expires_in: settings.upload_url_expiry_secs,
    })
}

/// Borrow the entries of a batch `files` value, which must be an array.
fn batch_entries<'a>(files: Option<&'a Value>, empty_message: &str) -> Result<&'a [Value], AppError> {
    let entries = files
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::bad_request("files must be an array"))?;
    if entries.is_empty() {
        return Err(AppError::bad_request(empty_message.to_string()));
    }
    Ok(entries)
}

/// Validate one batch entry, returning `(filename, contentType, fileSize)`.
fn batch_file_fields(entry: &Value, max_size: u64) -> Result<(String, String, Option<u64>), AppError> {
    let fields = serde_json::from_value::<BatchFileEntry>(entry.clone())
        .map_err(|_| AppError::bad_request("Invalid file entry"))?;
    let filename = fields
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("filename is required"))?;
    let content_type = fields
        .content_type
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("contentType is required"))?;
    validate_content_type(&content_type)?;
    let file_size = parse_file_size(fields.file_size.as_ref(), max_size)?;
    Ok((filename, content_type, file_size))
}

/// Issue presigned PUTs for up to [`MAX_BATCH_FILES`] files of one lesson.
///
/// The course, the lesson and the shape of `files` are checked up front and
/// fail the whole request. After that each entry succeeds or fails on its own.
pub async fn issue_upload_grants(
    store: &dyn ObjectStore,
    req: &BatchUploadGrantRequest,
    settings: &ServiceSettings,
) -> Result<BatchOutcome<BatchUploadGrant>, AppError> {
    let course_id = req.course_id.as_deref().unwrap_or_default();
    let lesson_id = req.lesson_id.as_deref().unwrap_or_default();
    validate_id("courseId", course_id)?;
    validate_id("lessonId", lesson_id)?;

    let entries = batch_entries(req.files.as_ref(), "At least one file is required")?;
    if entries.len() > MAX_BATCH_FILES {
        return Err(AppError::bad_request(format!(
            "Maximum {} files allowed per request",
            MAX_BATCH_FILES
        )));
    }

    let mut granted = Vec::new();
    let mut errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let issued = match batch_file_fields(entry, settings.max_batch_file_size) {
            Ok((filename, content_type, file_size)) => presign_lesson_file(
                store, settings, course_id, lesson_id, &filename, &content_type, file_size,
            )
            .await
            .map(|grant| BatchUploadGrant {
                index,
                filename,
                grant,
                content_type,
                file_size,
            }),
            Err(err) => Err(err),
        };

        match issued {
            Ok(grant) => granted.push(grant),
            Err(err) => {
                warn!(index, error = %err, "batch upload entry rejected");
                errors.push(BatchFailure {
                    index: Some(index),
                    filename: entry.get("filename").and_then(Value::as_str).map(str::to_string),
                    file_key: None,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        requested = entries.len(),
        successful = granted.len(),
        failed = errors.len(),
        "issued batch presigned uploads"
    );
    Ok(BatchOutcome::new(entries.len(), granted, errors))
}

/// Confirm each entry of a batch independently, as `POST /confirm` would.
pub fn confirm_uploads(
    store: &dyn ObjectStore,
    req: &BatchConfirmRequest,
) -> Result<BatchOutcome<ConfirmedUpload>, AppError> {
    let entries = batch_entries(req.files.as_ref(), "files array is required")
        .map_err(|_| AppError::bad_request("files array is required"))?;

    let mut confirmed = Vec::new();
    let mut errors = Vec::new();
    for entry in entries {
        let outcome = serde_json::from_value::<ConfirmUploadRequest>(entry.clone())
            .map_err(|_| AppError::bad_request("Invalid file entry"))
            .and_then(|req| confirm_upload(store, req));
        match outcome {
            Ok(upload) => confirmed.push(upload),
            Err(err) => {
                let file_key = entry.get("fileKey").and_then(Value::as_str).map(str::to_string);
                warn!(file_key = file_key.as_deref().unwrap_or_default(), error = %err, "batch confirm entry rejected");
                errors.push(BatchFailure {
                    index: None,
                    filename: None,
                    file_key,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        requested = entries.len(),
        successful = confirmed.len(),
        failed = errors.len(),
        "batch uploads confirmed"
    );
    Ok(BatchOutcome::new(entries.len(), confirmed, errors))
}

/// Echo the client's metadata for an upload it already performed.
///
/// Does not check that the object exists.
pub fn confirm_upload(
    store: &dyn ObjectStore,
    req: ConfirmUploadRequest,
) -> Result<ConfirmedUpload, AppError> {
    let file_key = req
        .file_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("fileKey is required"))?;
    ensure_key_safe(&file_key)?;

    Ok(ConfirmedUpload {
        url: store.public_url(&file_key),
        key: file_key,
        name: req.file_name,
        size: req.file_size.filter(|v| !v.is_null()),
        file_type: req.file_type,
    })
}

fn decode_pdf(data: &str) -> Result<Bytes, AppError> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        data
    };
    let compact = payload
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();

    match general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => Ok(Bytes::from(bytes)),
        _ => Err(AppError::bad_request("Invalid base64 PDF data")),
    }
}

/// `payment_pdf/{sanitizedUser}_{userId}/{paymentId}_{millis}.pdf`.
pub fn receipt_key(user_name: Option<&str>, user_id: &str, payment_id: &str, now: DateTime<Utc>) -> String {
    format!(
        "payment_pdf/{}_{}/{}_{}.pdf",
        sanitize_name_segment(user_name.unwrap_or("")),
        user_id,
        payment_id,
        now.timestamp_millis()
    )
}

/// Decode a base64 receipt and store it as a PDF.
pub async fn store_payment_receipt(
    store: &dyn ObjectStore,
    req: PaymentReceiptRequest,
) -> Result<StoredReceipt, AppError> {
    require(&[
        ("pdfBase64", req.pdf_base64.as_deref()),
        ("paymentId", req.payment_id.as_deref()),
        ("userId", req.user_id.as_deref()),
    ])?;
    let (Some(pdf_base64), Some(payment_id), Some(user_id)) = (
        req.pdf_base64.as_deref(),
        req.payment_id.as_deref(),
        req.user_id.as_deref(),
    ) else {
        return Err(AppError::bad_request("Missing required fields"));
    };

    validate_id("paymentId", payment_id)?;
    validate_id("userId", user_id)?;
    let pdf = decode_pdf(pdf_base64).inspect_err(|_| warn!(payment_id, "rejected receipt with invalid base64"))?;

    let file_key = receipt_key(req.user_name.as_deref(), user_id, payment_id, Utc::now());
    let size = pdf.len();
    store.put(&file_key, pdf, RECEIPT_CONTENT_TYPE).await?;
    info!(file_key = %file_key, size, "stored payment receipt");

    let filename = req
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| format!("Payment_Receipt_{}.pdf", payment_id));

    Ok(StoredReceipt {
        url: store.public_url(&file_key),
        file_key,
        filename,
    })
}
