//! Shared fixtures for link-archiver integration tests

#![allow(dead_code)]
// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use link_archiver::config::{LocalStorageConfig, RetryConfig};
use link_archiver::context::StorageSet;
use link_archiver::databases::SqliteDatabase;
use link_archiver::formatters::HtmlFormatter;
use link_archiver::media::Media;
use link_archiver::storages::LocalStorage;
use link_archiver::{
    ArchiveOutcome, Archiver, ArchivingContext, ArchivingOrchestrator, Backends, Database,
    Formatter, Metadata, ProjectDetails, Storage,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Writes one small video file per download and counts its calls
#[derive(Default)]
pub struct FileArchiver {
    downloads: AtomicUsize,
}

impl FileArchiver {
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Archiver for FileArchiver {
    fn name(&self) -> &str {
        "file_archiver"
    }

    fn sanitize_url(&self, url: &str) -> String {
        url.split('?').next().unwrap_or(url).to_string()
    }

    async fn download(&self, item: &Metadata, ctx: &ArchivingContext) -> ArchiveOutcome {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !item.get_url().contains("/video") {
            return ArchiveOutcome::Declined;
        }
        let path = ctx.tmp_dir.join("clip.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();

        let mut result = Metadata::new(item.get_url());
        result
            .success(self.name())
            .set_title("A clip")
            .add_media(Media::new(path).with_content_type("video/mp4"));
        ArchiveOutcome::Archived(result)
    }
}

/// Temporary layout for one archiving run
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn archived(&self) -> std::path::PathBuf {
        self.dir.path().join("archived")
    }

    pub async fn database(&self) -> Arc<SqliteDatabase> {
        Arc::new(
            SqliteDatabase::new(&self.dir.path().join("archive.db"), true)
                .await
                .unwrap(),
        )
    }

    /// Orchestrator with local storage, the given database and the HTML formatter
    pub async fn orchestrator(
        &self,
        archiver: Arc<FileArchiver>,
        database: Arc<SqliteDatabase>,
    ) -> ArchivingOrchestrator {
        let storage = LocalStorage::new(
            LocalStorageConfig {
                name: None,
                save_to: self.archived(),
                save_absolute: false,
            },
            RetryConfig {
                max_attempts: 1,
                initial_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let backends = Backends {
            archivers: vec![archiver as Arc<dyn Archiver>],
            storages: StorageSet {
                primary: vec![Arc::new(storage) as Arc<dyn Storage>],
                ..Default::default()
            },
            databases: vec![database as Arc<dyn Database>],
            formatter: Some(Arc::new(HtmlFormatter) as Arc<dyn Formatter>),
            ..Default::default()
        };
        let project = ProjectDetails {
            project_name: "proj".to_string(),
            ..Default::default()
        };
        ArchivingOrchestrator::new(backends, project, self.dir.path().join("work")).await
    }
}

/// Every regular file below `root`
pub fn files_under(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}
