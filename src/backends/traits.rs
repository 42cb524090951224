//! Capability contracts implemented by concrete backends

use crate::context::ArchivingContext;
use crate::media::{Media, Property};
use crate::metadata::Metadata;
use crate::types::RowContext;
use async_trait::async_trait;

/// Result of asking one archiver to download an item
///
/// `Declined` is the normal "not my kind of URL" answer and is not logged as
/// an error.
#[must_use]
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// The archiver produced a record (possibly with no media)
    Archived(Metadata),
    /// The archiver does not handle this URL
    Declined,
    /// The archiver tried and failed
    Failed(crate::Error),
}

impl ArchiveOutcome {
    /// Fold a fallible download into an outcome
    pub fn from_result(result: crate::Result<Option<Metadata>>) -> Self {
        match result {
            Ok(Some(item)) => ArchiveOutcome::Archived(item),
            Ok(None) => ArchiveOutcome::Declined,
            Err(e) => ArchiveOutcome::Failed(e),
        }
    }
}

/// What a storage backend reports after persisting one media
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Retrieval URL appended to the media's destination list
    pub url: String,
    /// Extra properties to set on the media (e.g. a storage key)
    pub properties: Vec<(String, Property)>,
}

impl StoredObject {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            properties: Vec::new(),
        }
    }

    /// Builder-style extra property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Property>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }
}

/// One unit of work produced by a feeder
#[derive(Debug, Clone)]
pub struct FeedItem {
    /// Record seeded with the source URL
    pub item: Metadata,
    /// Where the item lives in the tracking store
    pub row: RowContext,
}

/// Produces the items to archive
///
/// The sequence is lazy, finite and not restartable.
#[async_trait]
pub trait Feeder: Send {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Next item, or `None` once the feed is exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying tracking store cannot be read.
    async fn next_item(&mut self) -> crate::Result<Option<FeedItem>>;

    /// Row-advancement hint for the item just processed
    ///
    /// Called after every item with the number of primary media it produced,
    /// so that multi-media items offset subsequent rows.
    fn set_row_offset(&mut self, _offset: usize) {}
}

/// Retrieves content for a URL
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Name used in configuration, logs, and status messages
    fn name(&self) -> &str;

    /// One-time preparation before the first item
    ///
    /// # Errors
    ///
    /// A failing setup is logged by the orchestrator, which keeps running.
    async fn setup(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Release anything acquired in [`setup`](Self::setup)
    async fn cleanup(&self) -> crate::Result<()> {
        Ok(())
    }

    /// Canonicalize a URL before any download is attempted
    ///
    /// Must be pure and total: return the input unchanged if there is nothing
    /// to rewrite.
    fn sanitize_url(&self, url: &str) -> String {
        url.to_string()
    }

    /// Try to archive the item's working URL
    async fn download(&self, item: &Metadata, ctx: &ArchivingContext) -> ArchiveOutcome;

    /// Add attribution to an already-archived record without re-downloading
    ///
    /// # Errors
    ///
    /// The default implementation returns [`Error::NotSupported`](crate::Error::NotSupported).
    async fn fetch_credit(&self, _item: &mut Metadata, _ctx: &ArchivingContext) -> crate::Result<()> {
        Err(crate::Error::NotSupported(format!(
            "{} cannot fetch attribution",
            self.name()
        )))
    }
}

/// Adds information to an archived record in place
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    /// Mutate `item`; errors are logged by the orchestrator and never fatal
    async fn enrich(&self, item: &mut Metadata, ctx: &ArchivingContext) -> crate::Result<()>;
}

/// Persists one media to a destination
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Store `media`, returning where it can be retrieved
    ///
    /// `url` is the item's working URL, passed as a naming hint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the destination refuses it.
    async fn store(
        &self,
        media: &Media,
        url: &str,
        item: &Metadata,
        ctx: &ArchivingContext,
    ) -> crate::Result<StoredObject>;
}

/// Tracks item status and caches finished records
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// The pipeline started working on `item`
    async fn started(&self, _item: &Metadata) -> crate::Result<()> {
        Ok(())
    }

    /// Previously archived record for `item`'s URL, if any
    async fn fetch(&self, _item: &Metadata) -> crate::Result<Option<Metadata>> {
        Ok(None)
    }

    /// The pipeline finished; `cached` is set when the result came from a cache hit
    async fn done(&self, item: &Metadata, cached: bool) -> crate::Result<()>;

    /// The pipeline failed with `reason`
    async fn failed(&self, item: &Metadata, reason: &str) -> crate::Result<()>;

    /// The pipeline was interrupted
    async fn aborted(&self, item: &Metadata) -> crate::Result<()>;
}

/// Synthesizes one composite artifact from a finished record
#[async_trait]
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    /// Build the composite media, or `None` if there is nothing to render
    async fn format(&self, item: &Metadata, ctx: &ArchivingContext) -> crate::Result<Option<Media>>;
}
