//! # link-archiver
//!
//! Archiving orchestration engine. Tracked links go in; stored media,
//! enrichment metadata and a per-item status record come out, written to
//! every configured storage and database.
//!
//! ## Pipeline
//!
//! For each item the [`ArchivingOrchestrator`] validates and sanitizes the
//! URL, consults the databases for a cached result, tries the archivers in
//! order until one succeeds, runs every enricher, stores all media, renders a
//! final summary with the formatter and reports the outcome back to the
//! databases. Jobs arriving over the HTTP intake are scheduled by the
//! [`JobController`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use link_archiver::{Config, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     // Serve the job intake until SIGTERM/SIGINT
//!     run_with_shutdown(config).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Job intake HTTP API
pub mod api;
/// Archiver backends
pub mod archivers;
/// Backend traits and registry
pub mod backends;
/// Configuration types
pub mod config;
/// Per-item archiving context
pub mod context;
/// Database backends
pub mod databases;
/// Enricher backends
pub mod enrichers;
/// Error types
pub mod error;
/// Feeder backends
pub mod feeders;
/// Formatter backends
pub mod formatters;
/// Job concurrency controller
pub mod jobs;
/// Media records
pub mod media;
/// Item metadata records
pub mod metadata;
/// Archiving pipeline
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Storage backends
pub mod storages;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use backends::{
    ArchiveOutcome, Archiver, Backends, Database, Enricher, FeedItem, Feeder, Formatter, Storage,
};
pub use config::Config;
pub use context::ArchivingContext;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus, ValidationError};
pub use jobs::{JobController, JobRequest};
pub use media::{Media, Property};
pub use metadata::Metadata;
pub use orchestrator::{ArchivingOrchestrator, FeedSummary};
pub use types::{JobId, MediaBucket, ProjectDetails, RowContext, Status};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the job intake with graceful signal handling.
///
/// Starts a [`JobController`] and the intake API, then waits for a
/// termination signal. On shutdown, items still being archived are reported
/// as aborted and queued jobs are discarded.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the API cannot bind, or
/// the server stops with an error.
pub async fn run_with_shutdown(config: Config) -> Result<()> {
    config.validate()?;

    let cancel = CancellationToken::new();
    let controller = Arc::new(JobController::from_config(&config, cancel.clone()));
    let listener = tokio::net::TcpListener::bind(config.api.bind_address).await?;
    let mut server = tokio::spawn(api::serve_with_listener(
        listener,
        Arc::clone(&controller),
        cancel.clone(),
    ));

    let early_exit = tokio::select! {
        _ = wait_for_signal() => None,
        result = &mut server => Some(result),
    };

    tracing::info!("Shutting down job intake");
    cancel.cancel();
    controller.shutdown().await;

    let result = match early_exit {
        Some(result) => result,
        None => server.await,
    };
    result.map_err(|e| Error::Other(format!("API server task panicked: {}", e)))?
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
            _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
        },
        (Ok(mut remaining), Err(e)) | (Err(e), Ok(mut remaining)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            remaining.recv().await;
            tracing::info!("Received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
