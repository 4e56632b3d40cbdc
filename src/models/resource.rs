//! Course resources whose files may have text content extracted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A lesson resource row.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct Resource {
    pub resource_id: String,

    pub lesson_id: String,

    /// Object key of the attached file, if any.
    pub file_key: Option<String>,

    pub content_type: Option<String>,

    pub extracted_text: Option<String>,

    pub extracted_at: Option<DateTime<Utc>>,
}

/// Body of `POST /extract-content`; one selector is required.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractContentRequest {
    pub resource_id: Option<String>,
    pub resource_ids: Option<Vec<String>>,
    pub lesson_id: Option<String>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Skipped,
    Error,
}

/// Outcome for one resource of an extraction request.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub resource_id: String,
    pub status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn success(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExtractionStatus::Success,
            reason: None,
            error: None,
        }
    }

    pub fn skipped(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExtractionStatus::Skipped,
            reason: Some(reason.into()),
            error: None,
        }
    }

    pub fn failed(resource_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            status: ExtractionStatus::Error,
            reason: None,
            error: Some(error.into()),
        }
    }
}
