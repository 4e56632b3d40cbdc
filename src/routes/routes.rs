//! Defines the HTTP surface of the storage API.
//!
//! ## Structure
//! - **Access routes** (object bytes)
//!   - `GET  /course-certificate?key=|url=&mode=`
//!   - `GET  /document-access?key=|url=&mode=`
//!   - `GET  /payment-receipt?key=|url=&mode=`
//!
//! - **Upload routes**
//!   - `POST /presigned` - presigned direct upload
//!   - `POST /presigned-multiple` - up to ten presigned uploads for one lesson
//!   - `POST /confirm` - confirm a direct upload
//!   - `POST /confirm-multiple` - confirm several direct uploads
//!   - `POST /upload-payment-receipt` - base64 PDF upload
//!
//! - **File routes**
//!   - `GET    /files/{courseId}` - list course files
//!   - `GET    /files/{courseId}/{lessonId}` - list lesson files
//!   - `DELETE /files/{*key}` - delete one file
//!   - `POST   /files/delete` - delete many files
//!   - `POST   /get-url`, `/get-file-url` - public URL for a key
//!
//! - **Proxy URLs**: `POST /signed-url`, `POST /signed-urls`
//! - **Content**: `POST /extract-content`
//! - **Local backend only**: `PUT|GET /local-objects/{*key}`
//!
//! [`cors_layer`] wraps the whole router, so successes, errors and the
//! fallbacks all carry CORS headers and any `OPTIONS` is answered as a
//! preflight. Other unsupported methods get `405 {"error": "Method not allowed"}`.

use crate::{
    errors::AppError,
    handlers::{
        access_handlers::{course_certificate, document_access, payment_receipt},
        content_handlers::extract,
        extract::method_not_allowed,
        health_handlers::{healthz, readyz},
        local_object_handlers,
        signed_url_handlers::{signed_url, signed_urls},
        upload_handlers::{
            confirm, confirm_multiple, delete_file, delete_files, get_file_url, list_files,
            list_files_missing_ids, presigned_upload, presigned_uploads, upload_payment_receipt,
        },
    },
    services::{
        AppState,
        store::{LocalStore, local::LOCAL_OBJECTS_ROUTE},
    },
};
use axum::{
    Router,
    http::Method,
    routing::{MethodRouter, get, post, put},
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Any origin may call the API; browsers fetch documents cross-origin.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(CORS_MAX_AGE)
}

/// Attach the JSON 405 fallback to a method router.
fn guarded<S>(router: MethodRouter<S>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.fallback(method_not_allowed)
}

async fn route_not_found() -> AppError {
    AppError::not_found("Not found")
}

/// Build the router for all storage routes.
///
/// `local` mounts the upload/download routes of the local development
/// backend; pass `None` when serving from R2.
pub fn routes(local: Option<LocalStore>) -> Router<AppState> {
    let mut router = Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // access routes
        .route("/course-certificate", guarded(get(course_certificate)))
        .route("/document-access", guarded(get(document_access)))
        .route("/payment-receipt", guarded(get(payment_receipt)))
        // uploads
        .route("/presigned", guarded(post(presigned_upload)))
        .route("/presigned-multiple", guarded(post(presigned_uploads)))
        .route("/confirm", guarded(post(confirm)))
        .route("/confirm-multiple", guarded(post(confirm_multiple)))
        .route("/upload-payment-receipt", guarded(post(upload_payment_receipt)))
        // files
        .route("/files/", guarded(get(list_files_missing_ids)))
        .route("/files/delete", guarded(post(delete_files)))
        .route(
            "/files/{*path}",
            guarded(get(list_files).delete(delete_file)),
        )
        .route("/get-url", guarded(post(get_file_url)))
        .route("/get-file-url", guarded(post(get_file_url)))
        // proxy urls
        .route("/signed-url", guarded(post(signed_url)))
        .route("/signed-urls", guarded(post(signed_urls)))
        // content
        .route("/extract-content", guarded(post(extract)))
        .fallback(route_not_found);

    if let Some(store) = local {
        let local_router = Router::new()
            .route(
                &format!("{}/{{*key}}", LOCAL_OBJECTS_ROUTE),
                guarded(
                    put(local_object_handlers::upload_object).get(local_object_handlers::get_object),
                ),
            )
            .with_state(store);
        router = router.merge(local_router);
    }

    router.layer(cors_layer())
}
