//! Route handlers for the intake API

use super::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /jobs - Submit a job message
///
/// The body is decoded as a [`JobRequest`](crate::jobs::JobRequest). Decodable
/// messages are queued (`202`); undecodable ones are acknowledged and dropped
/// (`200`) so the sender does not redeliver them.
pub async fn submit_job(State(state): State<AppState>, body: Bytes) -> Response {
    match state.controller.submit_raw(&body) {
        Ok(true) => (StatusCode::ACCEPTED, Json(json!({"status": "queued"}))).into_response(),
        Ok(false) => (StatusCode::OK, Json(json!({"status": "dropped"}))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /health - Health check
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
