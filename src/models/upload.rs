//! Upload grants and confirmations exchanged with clients uploading
//! directly to the object store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `POST /presigned`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrantRequest {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
    /// Number or numeric string.
    pub file_size: Option<Value>,
}

/// Body of `POST /confirm`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadRequest {
    pub file_key: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<Value>,
    pub file_type: Option<String>,
}

/// Body of `POST /upload-payment-receipt`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceiptRequest {
    /// Raw base64 or a `data:application/pdf;base64,...` URL.
    pub pdf_base64: Option<String>,
    pub payment_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub filename: Option<String>,
}

/// A presigned PUT produced by a store adapter.
#[derive(Clone, Debug)]
pub struct PresignedPut {
    pub url: String,
    /// Headers the client must send with the PUT.
    pub headers: BTreeMap<String, String>,
}

/// Time-boxed authorization to upload a single object.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    pub upload_url: String,
    pub file_key: String,
    pub headers: BTreeMap<String, String>,
    /// Seconds the upload URL stays valid.
    pub expires_in: u32,
}

/// Metadata echo for an upload the client already performed.
///
/// Optional fields are omitted when the client did not send them.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConfirmedUpload {
    pub key: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// Result of a server-side payment receipt upload.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredReceipt {
    pub url: String,
    pub file_key: String,
    pub filename: String,
}

/// Body of `POST /presigned-multiple`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadGrantRequest {
    /// Array of [`BatchFileEntry`]; kept raw so a non-array is a 400, not a parse failure.
    pub files: Option<Value>,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
}

/// One entry of a batch grant request.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BatchFileEntry {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<Value>,
}

/// Body of `POST /confirm-multiple`. Entries have the `POST /confirm` shape.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct BatchConfirmRequest {
    pub files: Option<Value>,
}

/// A grant issued for entry `index` of a batch.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadGrant {
    pub index: usize,
    pub filename: String,
    #[serde(flatten)]
    pub grant: UploadGrant,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// A batch entry that failed. Grants are identified by `index`,
/// confirmations by `fileKey`.
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    pub error: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub requested: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Per-entry outcomes of a batch request; `errors` is omitted when empty.
#[derive(Serialize, Debug)]
pub struct BatchOutcome<T> {
    pub files: Vec<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchFailure>,
    pub summary: BatchSummary,
}

impl<T> BatchOutcome<T> {
    pub fn new(requested: usize, files: Vec<T>, errors: Vec<BatchFailure>) -> Self {
        let summary = BatchSummary {
            requested,
            successful: files.len(),
            failed: errors.len(),
        };
        Self {
            files,
            errors,
            summary,
        }
    }
}
