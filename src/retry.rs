//! Retry logic with exponential backoff
//!
//! Storage copies and HTTP downloads go through [`with_retry`] so that a
//! transient failure (connection reset, timeout, 5xx) does not turn into a
//! declined archiver or a missing destination URL.
//!
//! # Example
//!
//! ```no_run
//! use link_archiver::retry::{IsRetryable, with_retry};
//! use link_archiver::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, "upload", || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (invalid URL, missing binary, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Retry on timeouts and busy states, but not on "not found" errors
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("busy") || msg.contains("temporary")
            }
            Error::Validation(_)
            | Error::Config { .. }
            | Error::Backend { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Serialization(_)
            | Error::NotSupported(_)
            | Error::Job { .. }
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Delays between attempts of one retried operation
///
/// Grows by `backoff_multiplier` up to `max_delay`; jitter is applied to each
/// returned delay, never to the base of the next one.
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            next: config.initial_delay,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = Duration::from_secs_f64(base.as_secs_f64() * self.config.backoff_multiplier)
            .min(self.config.max_delay);
        if self.config.jitter { add_jitter(base) } else { base }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries
///
/// `what` names the operation in logs (e.g. `"local_storage copy"`). Returns
/// the last error after `max_attempts` retries; non-retryable errors are
/// returned immediately.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(what, attempts = retries + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        if retries >= config.max_attempts {
            tracing::error!(what, error = %err, attempts = retries + 1, "Giving up after retries");
            return Err(err);
        }

        retries += 1;
        let delay = backoff.next_delay();
        tracing::warn!(
            what,
            error = %err,
            retry = retries,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis(),
            "Transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
