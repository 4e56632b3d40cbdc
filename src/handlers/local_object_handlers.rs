//! Upload and download routes backing the local development store.
//!
//! Presigned uploads issued by [`LocalStore`] point at `PUT`, public URLs at
//! `GET`. Bodies are streamed to disk without buffering in memory.

use crate::{
    errors::AppError,
    handlers::shaper::{AccessMode, DOCUMENT, shape},
    services::{key_resolver::query_param, store::LocalStore, store::ObjectStore},
};
use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::StreamExt;
use std::io;
use tracing::{info, warn};

/// `PUT /local-objects/{*key}?expires=`
pub async fn upload_object(
    State(store): State<LocalStore>,
    Path(key): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let expires = query
        .as_deref()
        .and_then(|q| query_param(q, "expires"))
        .and_then(|v| v.parse::<i64>().ok());
    if let Some(expires) = expires {
        if Utc::now().timestamp() > expires {
            warn!(key = %key, "expired local upload URL");
            return Err(AppError::new(StatusCode::FORBIDDEN, "Upload URL has expired"));
        }
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let meta = store.upload_stream(&key, content_type, stream).await?;
    info!(key = %key, size = meta.size, "stored local object");

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// `GET /local-objects/{*key}`
pub async fn get_object(
    State(store): State<LocalStore>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let object = store.get(&key).await?;
    shape(object, &key, AccessMode::Inline, &DOCUMENT)
}
