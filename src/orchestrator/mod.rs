//! Archiving orchestration engine
//!
//! Drives one input URL through the fixed pipeline
//! `sanitize → cache check → archive → enrich → store → format → finalize`.
//!
//! Failure policy:
//! - A URL that fails [`assert_valid_url`] never reaches any backend; the
//!   databases are told the item failed.
//! - Any single backend call that errors is logged and treated as declined or
//!   a no-op; the item keeps going.
//! - A cancellation (external interrupt) tells every database the item was
//!   aborted before the item is released.

mod validation;


pub use validation::assert_valid_url;

use crate::backends::{ArchiveOutcome, Backends, FeedItem, Feeder};
use crate::config::Config;
use crate::context::{ArchivingContext, StorageSet};
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::types::{ProjectDetails, RowContext, Status};
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counts reported by [`ArchivingOrchestrator::feed`]
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    /// Items that reached the finalize stage (cache hits included)
    pub processed: usize,
    /// Items that failed validation or raised an unhandled error
    pub failed: usize,
    /// Whether the run stopped because of cancellation
    pub aborted: bool,
}

/// Runs items through the configured backends
pub struct ArchivingOrchestrator {
    backends: Backends,
    storages: Arc<StorageSet>,
    project: Arc<ProjectDetails>,
    tmp_root: PathBuf,
}

impl ArchivingOrchestrator {
    /// Create an orchestrator and run every archiver's setup
    ///
    /// A failing setup is logged; the orchestrator still runs and that
    /// archiver will typically decline every URL.
    pub async fn new(backends: Backends, project: ProjectDetails, tmp_root: PathBuf) -> Self {
        for archiver in &backends.archivers {
            if let Err(e) = archiver.setup().await {
                tracing::warn!(archiver = archiver.name(), error = %e, "Archiver setup failed");
            }
        }
        let storages = Arc::new(backends.storages.clone());
        Self {
            backends,
            storages,
            project: Arc::new(project),
            tmp_root,
        }
    }

    /// Validate `config`, build its backends, and create an orchestrator
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a backend cannot be built.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let backends = Backends::from_config(config).await?;
        Ok(Self::new(backends, config.project.clone(), config.tmp_dir.clone()).await)
    }

    /// Project details every item is archived under
    pub fn project(&self) -> &ProjectDetails {
        &self.project
    }

    /// Process every item `feeder` yields, in order, until it is exhausted or
    /// `cancel` fires
    ///
    /// After each item the feeder receives the row-advancement hint. Archiver
    /// cleanup runs once at the end, whether or not the run was aborted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the feeder itself fails; per-item failures are
    /// reported to the databases and counted in the summary.
    pub async fn feed(&self, feeder: &mut dyn Feeder, cancel: &CancellationToken) -> Result<FeedSummary> {
        let mut summary = FeedSummary::default();
        tracing::info!(feeder = feeder.name(), "Starting feed");

        let result = loop {
            if cancel.is_cancelled() {
                summary.aborted = true;
                break Ok(());
            }
            let fed = match feeder.next_item().await {
                Ok(Some(fed)) => fed,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            match self.feed_item(fed, cancel).await {
                Some(item) => {
                    summary.processed += 1;
                    feeder.set_row_offset(item.primary_media_count());
                }
                None => {
                    if cancel.is_cancelled() {
                        summary.aborted = true;
                        break Ok(());
                    }
                    summary.failed += 1;
                    feeder.set_row_offset(0);
                }
            }
        };

        self.cleanup().await;
        tracing::info!(
            feeder = feeder.name(),
            processed = summary.processed,
            failed = summary.failed,
            aborted = summary.aborted,
            "Feed finished"
        );
        result.map(|()| summary)
    }

    /// Archive one fed item with failure and abort handling
    ///
    /// Returns the finished record, or `None` if the item failed or was
    /// aborted (in which case every database has already been notified).
    pub async fn feed_item(&self, fed: FeedItem, cancel: &CancellationToken) -> Option<Metadata> {
        let FeedItem { item, row } = fed;
        let snapshot = item.clone();

        let tmp = match self.item_tmp_dir().await {
            Ok(tmp) => tmp,
            Err(e) => {
                self.notify_failed(snapshot, &e).await;
                return None;
            }
        };
        let ctx = self.context_for(tmp.path().to_path_buf(), row);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(url = snapshot.get_url(), "Interrupted, aborting item");
                let mut aborted = snapshot;
                aborted.set_status(Status::Aborted);
                for db in &self.backends.databases {
                    if let Err(e) = db.aborted(&aborted).await {
                        tracing::error!(database = db.name(), error = %e, "Database aborted notification failed");
                    }
                }
                None
            }
            result = self.archive(item, &ctx) => match result {
                Ok(done) => Some(done),
                Err(e) => {
                    self.notify_failed(snapshot, &e).await;
                    None
                }
            }
        }
    }

    /// Archive one item without a feeder: default row, no cancellation
    pub async fn process(&self, item: Metadata) -> Option<Metadata> {
        let fed = FeedItem {
            item,
            row: RowContext::default(),
        };
        self.feed_item(fed, &CancellationToken::new()).await
    }

    /// Run the pipeline for one item
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the URL is unsafe; no backend is
    /// called in that case. Backend errors never surface here.
    pub async fn archive(&self, mut item: Metadata, ctx: &ArchivingContext) -> Result<Metadata> {
        assert_valid_url(item.get_url())?;
        item.set_status(Status::InProgress);

        // 1. sanitize
        let mut url = item.get_url().to_string();
        for archiver in &self.backends.archivers {
            url = archiver.sanitize_url(&url);
        }
        assert_valid_url(&url)?;
        item.set_sanitized_url(url);
        let url = item.get_url().to_string();
        tracing::info!(url = %url, row = ctx.row.row, "Archiving");

        // 2. cache check
        for db in &self.backends.databases {
            if let Err(e) = db.started(&item).await {
                tracing::error!(database = db.name(), error = %e, "Database started notification failed");
            }
        }
        let mut hits = 0usize;
        for db in &self.backends.databases {
            match db.fetch(&item).await {
                Ok(Some(hit)) => {
                    tracing::debug!(database = db.name(), url = %url, "Cache hit");
                    item.merge(hit);
                    hits += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::error!(database = db.name(), error = %e, "Database fetch failed"),
            }
        }
        if hits > 0 {
            self.notify_done(&item, true).await;
            return Ok(item);
        }

        // 3. archive
        for archiver in &self.backends.archivers {
            match archiver.download(&item, ctx).await {
                ArchiveOutcome::Archived(result) => {
                    item.merge(result);
                    if item.is_success() {
                        tracing::info!(archiver = archiver.name(), url = %url, "Archived");
                        self.fetch_credit_if_missing(&mut item, archiver.name(), ctx).await;
                        break;
                    }
                }
                ArchiveOutcome::Declined => {
                    tracing::debug!(archiver = archiver.name(), url = %url, "Archiver declined");
                }
                ArchiveOutcome::Failed(e) => {
                    tracing::error!(archiver = archiver.name(), url = %url, error = %e, "Archiver failed");
                }
            }
        }

        // 4. positional ids, nested primary media included
        let mut position = 0usize;
        item.for_each_media_mut(&mut |media| {
            if media.is_primary() {
                position += 1;
                media.set_id(format!("media_{}", position));
            }
        });

        // 5. enrich
        for enricher in &self.backends.enrichers {
            if let Err(e) = enricher.enrich(&mut item, ctx).await {
                tracing::error!(enricher = enricher.name(), url = %url, error = %e, "Enricher failed");
            }
        }

        // 6. stamp naming context
        let title = item.title().unwrap_or_default().to_string();
        let timestamp = item.timestamp().unwrap_or_else(Utc::now).to_rfc3339();
        let project_name = self.project.project_name.clone();
        let row = ctx.row.row;
        let name_prefix = ctx.row.name_prefix.clone();
        item.for_each_media_mut(&mut |media| {
            media
                .set("row", row)
                .set("name_prefix", name_prefix.as_str())
                .set("uar", unique_archival_reference(&project_name))
                .set("title", title.as_str())
                .set("timestamp", timestamp.as_str());
        });

        // 7. store
        let stored = item.store(ctx).await;
        tracing::debug!(url = %url, stored, "Stored media");

        // 8. format
        if let Some(formatter) = &self.backends.formatter {
            match formatter.format(&item, ctx).await {
                Ok(Some(mut final_media)) => {
                    final_media
                        .set("row", row)
                        .set("uar", unique_archival_reference(&project_name));
                    final_media.store(&url, &item, ctx).await;
                    item.set_final_media(final_media);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(formatter = formatter.name(), error = %e, "Formatter failed"),
            }
        }

        // 9. nothing archived
        if item.is_empty() || !item.status().is_terminal() {
            item.set_status(Status::NothingArchived);
        }

        // 10. finalize
        self.notify_done(&item, false).await;
        tracing::info!(url = %url, status = %item.status_message(), "Item finished");
        Ok(item)
    }

    /// Release archiver resources
    pub async fn cleanup(&self) {
        for archiver in &self.backends.archivers {
            if let Err(e) = archiver.cleanup().await {
                tracing::warn!(archiver = archiver.name(), error = %e, "Archiver cleanup failed");
            }
        }
    }

    async fn fetch_credit_if_missing(&self, item: &mut Metadata, winner: &str, ctx: &ArchivingContext) {
        if item.credit_string().is_some() {
            return;
        }
        let Some(fallback) = &self.backends.credit_fallback else {
            return;
        };
        if fallback.name() == winner {
            return;
        }
        if let Err(e) = fallback.fetch_credit(item, ctx).await {
            tracing::warn!(archiver = fallback.name(), error = %e, "Attribution lookup failed");
        }
    }

    async fn notify_done(&self, item: &Metadata, cached: bool) {
        for db in &self.backends.databases {
            if let Err(e) = db.done(item, cached).await {
                tracing::error!(database = db.name(), error = %e, "Database done notification failed");
            }
        }
    }

    async fn notify_failed(&self, mut item: Metadata, err: &Error) {
        tracing::error!(url = item.get_url(), error = %err, "Item failed");
        item.set_status(Status::Failure);
        let reason = err.to_string();
        for db in &self.backends.databases {
            if let Err(e) = db.failed(&item, &reason).await {
                tracing::error!(database = db.name(), error = %e, "Database failed notification failed");
            }
        }
    }

    async fn item_tmp_dir(&self) -> Result<tempfile::TempDir> {
        tokio::fs::create_dir_all(&self.tmp_root).await?;
        Ok(tempfile::Builder::new()
            .prefix("item-")
            .tempdir_in(&self.tmp_root)?)
    }

    fn context_for(&self, tmp_dir: PathBuf, row: RowContext) -> ArchivingContext {
        ArchivingContext {
            storages: Arc::clone(&self.storages),
            project: Arc::clone(&self.project),
            tmp_dir,
            row,
        }
    }
}

/// `{project_name}_{two random lowercase letters}`
pub fn unique_archival_reference(project_name: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..2).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    format!("{}_{}", project_name, suffix)
}
