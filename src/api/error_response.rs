//! Conversion from domain errors to HTTP responses

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Renders `{"error": {"code", "message"}}` with the status from [`ToHttpStatus`]
///
/// Server-side failures other than shutdown are logged before rendering.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() && !matches!(self, Error::ShuttingDown) {
            tracing::error!(code = self.error_code(), error = %self, "Job intake request failed");
        }
        (status, Json(ApiError::from(self))).into_response()
    }
}
