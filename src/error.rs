//! Error types for link-archiver
//!
//! This module provides the error taxonomy used across the crate:
//! - Validation errors for unsafe or malformed input URLs (fatal to one item)
//! - Backend errors raised by a single archiver/enricher/storage/database call
//!   (recovered locally by the orchestrator)
//! - Job errors raised by a sub-operation inside the job controller
//!   (isolated to one request)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for link-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for link-archiver
///
/// Each variant carries enough context to produce a human-readable status
/// message when it is reported to a [`Database`](crate::backends::Database)
/// backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "project.project_name")
        key: Option<String>,
    },

    /// Input URL was rejected before any backend ran
    #[error("invalid URL: {0}")]
    Validation(#[from] ValidationError),

    /// A single backend call failed
    #[error("{backend}: {message}")]
    Backend {
        /// Name of the backend that failed (e.g., "local_storage")
        backend: String,
        /// What went wrong
        message: String,
    },

    /// Database backend operation failed
    #[error("database error: {0}")]
    Database(String),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp, ffprobe, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, disabled backend)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A job sub-operation failed
    #[error("job {job_id} operation {operation} failed: {message}")]
    Job {
        /// Job identity the operation belonged to
        job_id: String,
        /// Name of the sub-operation (e.g., "run_auto_archiver")
        operation: String,
        /// Error detail
        message: String,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Backend`] from a backend name and any displayable error
    pub fn backend(backend: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`Error::Config`] for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error is a URL validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Reasons an input URL is refused
///
/// The orchestrator rejects URLs that could be used to reach internal services
/// (server-side request forgery through user-supplied links).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// URL could not be parsed at all
    #[error("unparseable URL: {0}")]
    Unparseable(String),

    /// Scheme other than http/https
    #[error("invalid URL scheme")]
    InvalidScheme,

    /// URL has no hostname
    #[error("invalid URL hostname")]
    MissingHostname,

    /// Hostname is localhost
    #[error("localhost is not allowed")]
    Localhost,

    /// Host is a loopback, private, link-local, or reserved IP address
    #[error("invalid IP used: {0}")]
    NonPublicAddress(std::net::IpAddr),
}

/// API error response body
///
/// ```json
/// {"error": {"code": "shutting_down", "message": "shutdown in progress: not accepting new jobs"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetail,
}

/// Machine-readable code plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Maps errors onto HTTP status codes for the intake API
pub trait ToHttpStatus {
    fn status_code(&self) -> u16;

    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } | Error::Validation(_) => 400,
            Error::Serialization(_) => 400,
            Error::NotSupported(_) => 501,
            Error::Network(_) | Error::Backend { .. } => 502,
            Error::ShuttingDown | Error::ExternalTool(_) => 503,
            Error::Database(_)
            | Error::Sqlx(_)
            | Error::Io(_)
            | Error::Job { .. }
            | Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Backend { .. } => "backend_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Job { .. } => "job_failed",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::new(error.error_code(), error.to_string())
    }
}
