//! Job intake API
//!
//! A small HTTP surface in front of the [`JobController`]: inbound job
//! messages are posted as raw bodies and either queued or dropped.

use crate::config::ApiConfig;
use crate::jobs::JobController;
use crate::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router
///
/// # Routes
///
/// - `POST /jobs` - Submit a job message (202 queued, 200 dropped)
/// - `GET /health` - Health check
pub fn create_router(controller: Arc<JobController>) -> Router {
    Router::new()
        .route("/jobs", post(routes::submit_job))
        .route("/health", get(routes::health_check))
        .with_state(AppState::new(controller))
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until `shutdown` fires
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    controller: Arc<JobController>,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(config.bind_address).await?;
    serve_with_listener(listener, controller, shutdown).await
}

/// Serve on an already-bound listener until `shutdown` fires
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve_with_listener(
    listener: TcpListener,
    controller: Arc<JobController>,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = listener.local_addr()?;
    tracing::info!(address = %address, "Job intake API listening");

    axum::serve(listener, create_router(controller))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Job intake API stopped");
    Ok(())
}

#[cfg(test)]
mod tests;
