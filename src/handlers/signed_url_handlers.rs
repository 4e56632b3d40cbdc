//! Proxy-URL issuance routes.

use crate::{
    errors::AppError,
    handlers::extract::JsonBody,
    services::{
        AppState,
        signed_url_service::{issue_signed_url, issue_signed_urls},
    },
};
use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlReq {
    pub file_key: Option<String>,
    pub url: Option<String>,
    /// Number or numeric string.
    pub expires_in: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlsReq {
    /// Checked by the service so shape errors get specific messages.
    pub urls: Option<Value>,
    pub expires_in: Option<Value>,
}

/// `POST /signed-url`
pub async fn signed_url(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignedUrlReq>,
) -> Result<Json<Value>, AppError> {
    let signed = issue_signed_url(
        req.file_key.as_deref(),
        req.url.as_deref(),
        req.expires_in.as_ref(),
        Utc::now(),
        &state.settings.api_base_url,
    )?;
    info!(expires_at = %signed.expires_at, "issued signed url");
    Ok(Json(json!({
        "success": true,
        "signedUrl": signed.signed_url,
        "expiresAt": signed.expires_at,
    })))
}

/// `POST /signed-urls`
pub async fn signed_urls(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignedUrlsReq>,
) -> Result<Json<Value>, AppError> {
    let batch = issue_signed_urls(
        req.urls.as_ref(),
        req.expires_in.as_ref(),
        Utc::now(),
        &state.settings.api_base_url,
    )?;
    info!(count = batch.signed_urls.len(), "issued signed url batch");
    Ok(Json(json!({
        "success": true,
        "signedUrls": batch.signed_urls,
        "expiresAt": batch.expires_at,
    })))
}
