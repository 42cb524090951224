//! Explicit per-item archiving context
//!
//! Every backend call receives an [`ArchivingContext`] by reference instead of
//! reading process-wide state. The orchestrator builds a fresh one for each
//! item it processes.

use crate::backends::Storage;
use crate::types::{MediaBucket, ProjectDetails, RowContext};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage backends grouped by the media bucket they accept
#[derive(Clone, Default)]
pub struct StorageSet {
    /// Destinations for ordinary media; these define when a media is "stored"
    pub primary: Vec<Arc<dyn Storage>>,
    /// Destinations for thumbnails
    pub thumbnail: Vec<Arc<dyn Storage>>,
    /// Destinations for rendered-page metadata sidecars
    pub html_metadata: Vec<Arc<dyn Storage>>,
    /// Destinations for screenshots
    pub screenshot: Vec<Arc<dyn Storage>>,
}

impl StorageSet {
    /// Storage list responsible for `bucket`
    pub fn for_bucket(&self, bucket: MediaBucket) -> &[Arc<dyn Storage>] {
        match bucket {
            MediaBucket::Primary => &self.primary,
            MediaBucket::Thumbnail => &self.thumbnail,
            MediaBucket::HtmlMetadata => &self.html_metadata,
            MediaBucket::Screenshot => &self.screenshot,
        }
    }

    /// Number of primary destinations a media needs before it counts as stored
    pub fn primary_count(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        MediaBucket::ALL.iter().all(|b| self.for_bucket(*b).is_empty())
    }
}

impl std::fmt::Debug for StorageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |list: &[Arc<dyn Storage>]| list.iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("StorageSet")
            .field("primary", &names(&self.primary))
            .field("thumbnail", &names(&self.thumbnail))
            .field("html_metadata", &names(&self.html_metadata))
            .field("screenshot", &names(&self.screenshot))
            .finish()
    }
}

/// Values every stage of one item's pipeline may need
#[derive(Clone, Debug)]
pub struct ArchivingContext {
    /// Active storage destinations
    pub storages: Arc<StorageSet>,
    /// Project-level naming values
    pub project: Arc<ProjectDetails>,
    /// Scratch directory for this item; removed when the item finishes
    pub tmp_dir: PathBuf,
    /// Position of the item in the tracking store
    pub row: RowContext,
}

impl ArchivingContext {
    pub fn new(storages: Arc<StorageSet>, project: Arc<ProjectDetails>, tmp_dir: PathBuf) -> Self {
        Self {
            storages,
            project,
            tmp_dir,
            row: RowContext::default(),
        }
    }

    /// Same backends and project, new item scratch space and row
    pub fn for_item(&self, tmp_dir: PathBuf, row: RowContext) -> Self {
        Self {
            storages: Arc::clone(&self.storages),
            project: Arc::clone(&self.project),
            tmp_dir,
            row,
        }
    }
}
