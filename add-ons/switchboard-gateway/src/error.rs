//! Maps every failure to the boundary's error taxonomy: 400 validation, 401 auth, 500 downstream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use switchboard_core::{DispatchError, DownstreamError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("invalid request body: {0}")]
    Body(String),

    #[error(transparent)]
    Validation(#[from] DispatchError),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Body(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request body", "details": details })),
            )
                .into_response(),
            ApiError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request", "field": e.field(), "details": e.to_string() })),
            )
                .into_response(),
            ApiError::Unauthorized(details) => unauthorized(&details),
            ApiError::Downstream(DownstreamError::Unauthorized { message, .. }) => unauthorized(&message),
            ApiError::Downstream(e) => {
                let mut body = json!({
                    "error": "Downstream request failed",
                    "status": e.status(),
                    "details": e.to_string(),
                });
                if matches!(e, DownstreamError::Timeout { .. }) {
                    body["timeout"] = json!(true);
                }
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

pub(crate) fn unauthorized(details: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized", "details": details })),
    )
        .into_response()
}
