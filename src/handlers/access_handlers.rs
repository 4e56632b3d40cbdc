//! GET routes serving object bytes: certificates, documents, receipts.

use crate::{
    errors::AppError,
    handlers::{
        extract::QueryParams,
        shaper::{AccessMode, AccessProfile, CERTIFICATE, DOCUMENT, PAYMENT_RECEIPT, shape},
    },
    services::{AppState, key_resolver::resolve_key},
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use tracing::{error, info, warn};

/// Query accepted by every access route.
#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub key: Option<String>,
    pub url: Option<String>,
    pub mode: Option<String>,
}

async fn serve(state: &AppState, q: AccessQuery, profile: &AccessProfile) -> Result<Response, AppError> {
    let has_key = q.key.as_deref().is_some_and(|k| !k.is_empty());
    let has_url = q.url.as_deref().is_some_and(|u| !u.is_empty());
    if !has_key && !has_url {
        return Err(AppError::bad_request("File key or URL is required"));
    }

    let mode = AccessMode::parse(q.mode.as_deref(), profile.default_mode)?;
    let key = resolve_key(q.key.as_deref(), q.url.as_deref()).ok_or_else(|| {
        warn!(url = q.url.as_deref().unwrap_or(""), "no key resolvable from URL");
        AppError::bad_request("Could not determine file key from URL")
    })?;

    let object = state.store.get(&key).await.map_err(|err| {
        error!(key = %key, error = %err, "object fetch failed");
        AppError::from(err)
    })?;
    if object.is_none() {
        info!(key = %key, "object not found");
    }

    shape(object, &key, mode, profile)
}

/// `GET /course-certificate?key=|url=&mode=`
pub async fn course_certificate(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<AccessQuery>,
) -> Result<Response, AppError> {
    serve(&state, q, &CERTIFICATE).await
}

/// `GET /document-access?key=|url=&mode=`
pub async fn document_access(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<AccessQuery>,
) -> Result<Response, AppError> {
    serve(&state, q, &DOCUMENT).await
}

/// `GET /payment-receipt?key=|url=&mode=`, downloads by default.
pub async fn payment_receipt(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<AccessQuery>,
) -> Result<Response, AppError> {
    serve(&state, q, &PAYMENT_RECEIPT).await
}
