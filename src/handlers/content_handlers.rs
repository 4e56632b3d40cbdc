//! `POST /extract-content`

use crate::{
    errors::AppError,
    handlers::extract::JsonBody,
    models::resource::{ExtractContentRequest, ExtractionStatus},
    services::{AppState, content_service::extract_content},
};
use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

pub async fn extract(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ExtractContentRequest>,
) -> Result<Json<Value>, AppError> {
    let results = extract_content(&state.db, state.store.as_ref(), req).await?;
    let processed = results
        .iter()
        .filter(|r| r.status == ExtractionStatus::Success)
        .count();

    info!(processed, total = results.len(), "content extraction finished");
    Ok(Json(json!({ "processed": processed, "results": results })))
}
