//! Error taxonomy for the request path.
//!
//! Only a store failure surfaces as a hard error. Malformed fields degrade
//! to neutral defaults in the normalizer, and an empty observation set is a
//! distinct "no data" response, not an error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("observation store unavailable: {0}")]
    Store(#[from] sqlx::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}
