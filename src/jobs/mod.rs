//! Job concurrency controller
//!
//! Inbound [`JobRequest`]s are buffered in arrival order in an unbounded
//! intake queue. A fixed number of dispatcher loops drain it; for each request
//! a dispatcher runs the configured [`JobOperation`]s one after another. Each
//! operation is gated by a per-(job, operation) lock and executed on a shared
//! worker pool bounded by a semaphore, and the dispatcher waits for it before
//! moving on. Operations of one job therefore run in program order, while
//! other jobs interleave in the pool.
//!
//! A failing operation is logged with its job identity and ends that request
//! only. Undecodable payloads are dropped at [`JobController::submit_raw`].

mod locks;
mod operations;
mod request;


pub use locks::JobLocks;
pub use operations::{
    ARCHIVE_OPERATION, ArchiveJobFactory, ArchiveOperation, ConfigArchiveFactory, JobOperation,
    MIRROR_OPERATION, MirrorSyncOperation,
};
pub use request::JobRequest;

use crate::config::{Config, JobsConfig};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared by every dispatcher loop
struct Dispatch {
    operations: Vec<Arc<dyn JobOperation>>,
    locks: JobLocks,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

/// Accepts job requests and runs them with bounded concurrency
pub struct JobController {
    intake: mpsc::UnboundedSender<JobRequest>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    dispatch: Arc<Dispatch>,
}

impl JobController {
    /// Spawn the dispatcher loops
    ///
    /// `operations` run in the given order for every request. Cancelling
    /// `cancel` stops intake, stops dispatchers from taking new requests, and
    /// is passed to running operations.
    pub fn start(
        operations: Vec<Arc<dyn JobOperation>>,
        config: &JobsConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (intake, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let dispatch = Arc::new(Dispatch {
            operations,
            locks: JobLocks::new(),
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            cancel,
        });

        let dispatchers = (0..config.dispatchers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let dispatch = Arc::clone(&dispatch);
                tokio::spawn(async move { dispatch_loop(worker_id, rx, dispatch).await })
            })
            .collect();

        tracing::info!(
            max_workers = config.max_workers,
            dispatchers = config.dispatchers,
            "Job controller started"
        );
        Self {
            intake,
            dispatchers: Mutex::new(dispatchers),
            dispatch,
        }
    }

    /// Controller running the archival pass, then the mirror pass if configured
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Self {
        let mut operations: Vec<Arc<dyn JobOperation>> = vec![Arc::new(ArchiveOperation::new(
            Arc::new(ConfigArchiveFactory::new(config.clone())),
        ))];
        if let Some(mirror) = &config.jobs.mirror {
            operations.push(Arc::new(MirrorSyncOperation::new(
                mirror.clone(),
                config.project.project_name.clone(),
            )));
        }
        Self::start(operations, &config.jobs, cancel)
    }

    /// Queue a decoded request
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the controller is cancelled.
    pub fn submit(&self, request: JobRequest) -> Result<()> {
        if self.dispatch.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        tracing::debug!(job_id = %request.job_id, "Job queued");
        self.intake.send(request).map_err(|_| Error::ShuttingDown)
    }

    /// Decode and queue a raw message body
    ///
    /// Returns `Ok(false)` if the body could not be decoded; the message is
    /// dropped and never enters the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the controller is cancelled.
    pub fn submit_raw(&self, body: &[u8]) -> Result<bool> {
        match JobRequest::from_slice(body) {
            Ok(request) => self.submit(request).map(|()| true),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable job message");
                Ok(false)
            }
        }
    }

    /// Token that stops this controller
    pub fn cancel_token(&self) -> CancellationToken {
        self.dispatch.cancel.clone()
    }

    /// Cancel and wait for every dispatcher to exit
    ///
    /// Requests still in the intake queue are discarded.
    pub async fn shutdown(&self) {
        self.dispatch.cancel.cancel();
        let dispatchers = std::mem::take(&mut *self.dispatchers.lock().await);
        for handle in dispatchers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher task panicked");
            }
        }
        tracing::info!("Job controller stopped");
    }
}

async fn dispatch_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<JobRequest>>>,
    dispatch: Arc<Dispatch>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = dispatch.cancel.cancelled() => None,
                request = rx.recv() => request,
            }
        };
        let Some(request) = next else {
            break;
        };

        tracing::info!(worker_id, job_id = %request.job_id, "Processing job");
        if let Err(e) = run_request(&dispatch, Arc::new(request.clone())).await {
            tracing::error!(worker_id, job_id = %request.job_id, error = %e, "Job failed");
        } else {
            tracing::info!(worker_id, job_id = %request.job_id, "Job finished");
        }
    }
    tracing::debug!(worker_id, "Dispatcher exiting");
}

/// Run every operation for one request, stopping at the first failure
async fn run_request(dispatch: &Dispatch, request: Arc<JobRequest>) -> Result<()> {
    for operation in &dispatch.operations {
        let _guard = dispatch.locks.acquire(&request.job_id, operation.name()).await;

        let permit = Arc::clone(&dispatch.workers)
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        let op = Arc::clone(operation);
        let req = Arc::clone(&request);
        let cancel = dispatch.cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            op.run(&req, &cancel).await
        });

        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("operation task panicked: {}", e))),
        };
        outcome.map_err(|e| Error::Job {
            job_id: request.job_id.to_string(),
            operation: operation.name().to_string(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}
