//! Request pipeline pieces shared by every route: JSON body and query
//! parsing, and wrong-method rejection. CORS is a router layer, see
//! [`crate::routes::routes::cors_layer`].

use crate::errors::AppError;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::warn;

/// JSON body extractor whose every rejection is `400 Invalid JSON body`.
///
/// The `Content-Type` header is not checked; clients posting JSON as
/// `text/plain` are accepted.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            warn!(error = %rejection, "failed to read request body");
            AppError::bad_request("Invalid JSON body")
        })?;

        serde_json::from_slice::<T>(&bytes)
            .map(JsonBody)
            .map_err(|err| {
                warn!(error = %err, "rejected malformed JSON body");
                AppError::bad_request("Invalid JSON body")
            })
    }
}

/// Query-string extractor rejecting with a JSON `400 Invalid query string`.
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::try_from_uri(&parts.uri)
            .map(|Query(value)| QueryParams(value))
            .map_err(|rejection| {
                warn!(error = %rejection, "rejected malformed query string");
                AppError::bad_request("Invalid query string").with_details(rejection.body_text())
            })
    }
}

/// Method-router fallback: `405 {"error": "Method not allowed"}`.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{StatusCode, header}};
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    struct Payload {
        name: Option<String>,
    }

    #[tokio::test]
    async fn parses_json_without_content_type() {
        let req = Request::builder()
            .method("POST")
            .uri("/x")
            .body(Body::from(r#"{"name":"a"}"#))
            .unwrap();
        let JsonBody(payload) = JsonBody::<Payload>::from_request(req, &()).await.unwrap();
        assert_eq!(payload.name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/x")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = JsonBody::<Payload>::from_request(req, &()).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid JSON body");
    }

    #[tokio::test]
    async fn duplicate_query_fields_are_bad_request() {
        let req = Request::builder()
            .uri("/x?name=a&name=b")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let err = QueryParams::<Payload>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid query string");
    }

    #[tokio::test]
    async fn query_fields_are_decoded() {
        let req = Request::builder()
            .uri("/x?name=a%2Fb")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let QueryParams(payload) = QueryParams::<Payload>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(payload.name.as_deref(), Some("a/b"));
    }
}
