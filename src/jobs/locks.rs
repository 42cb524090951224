use crate::types::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created mutual-exclusion tokens keyed by (job, operation)
///
/// The map only grows; a token is created the first time a pair is seen and
/// reused for every later request of that job.
#[derive(Clone, Default)]
pub struct JobLocks {
    tokens: Arc<Mutex<HashMap<(JobId, String), Arc<Mutex<()>>>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder runs `operation` for `job`
    pub async fn acquire(&self, job: &JobId, operation: &str) -> OwnedMutexGuard<()> {
        let token = {
            let mut tokens = self.tokens.lock().await;
            Arc::clone(
                tokens
                    .entry((job.clone(), operation.to_string()))
                    .or_default(),
            )
        };
        token.lock_owned().await
    }

    /// Number of (job, operation) pairs seen so far
    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
