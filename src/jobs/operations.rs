//! Named sub-operations a job runs, in order

use super::JobRequest;
use crate::backends::Feeder;
use crate::config::{Config, MirrorConfig};
use crate::error::{Error, Result};
use crate::feeders::ListFeeder;
use crate::orchestrator::ArchivingOrchestrator;
use crate::utils::{clean_string, project_dir_name};
use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Name of the archival pass
pub const ARCHIVE_OPERATION: &str = "run_auto_archiver";

/// Name of the destination mirroring pass
pub const MIRROR_OPERATION: &str = "rsync_destinations";

/// One step of a job
///
/// Operations with the same name never run concurrently for the same job.
#[async_trait]
pub trait JobOperation: Send + Sync {
    /// Name used for mutual exclusion and logging
    fn name(&self) -> &str;

    /// Run the operation for `request`
    ///
    /// # Errors
    ///
    /// An error stops the remaining operations of this request only.
    async fn run(&self, request: &JobRequest, cancel: &CancellationToken) -> Result<()>;
}

/// Builds the orchestrator and feeder for one job
#[async_trait]
pub trait ArchiveJobFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backends or the tracking rows cannot be loaded.
    async fn build(&self, request: &JobRequest) -> Result<(ArchivingOrchestrator, Box<dyn Feeder>)>;
}

/// Feeds a job's tracking rows through a fresh orchestrator
pub struct ArchiveOperation {
    factory: Arc<dyn ArchiveJobFactory>,
}

impl ArchiveOperation {
    pub fn new(factory: Arc<dyn ArchiveJobFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl JobOperation for ArchiveOperation {
    fn name(&self) -> &str {
        ARCHIVE_OPERATION
    }

    async fn run(&self, request: &JobRequest, cancel: &CancellationToken) -> Result<()> {
        let (orchestrator, mut feeder) = self.factory.build(request).await?;
        let summary = orchestrator.feed(feeder.as_mut(), cancel).await?;
        tracing::info!(
            job_id = %request.job_id,
            processed = summary.processed,
            failed = summary.failed,
            "Archive pass finished"
        );
        if summary.aborted {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }
}

/// Builds jobs from a base [`Config`] and per-job row files
///
/// The request's project name, when present, replaces the configured one.
#[derive(Clone)]
pub struct ConfigArchiveFactory {
    config: Config,
}

impl ConfigArchiveFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Tracking-row file for `request` under `rows_dir`
    pub fn rows_path(rows_dir: &Path, request: &JobRequest) -> PathBuf {
        let job = clean_string(request.job_id.as_str());
        let file = match request.sheet_name.as_deref().map(clean_string) {
            Some(sheet) if !sheet.is_empty() => format!("{}_{}.json", job, sheet),
            _ => format!("{}.json", job),
        };
        rows_dir.join(file)
    }
}

#[async_trait]
impl ArchiveJobFactory for ConfigArchiveFactory {
    async fn build(&self, request: &JobRequest) -> Result<(ArchivingOrchestrator, Box<dyn Feeder>)> {
        let mut config = self.config.clone();
        let requested = request.project_name_or(&self.config.project.project_name);
        config.project.project_name = project_dir_name(requested)
            .ok_or_else(|| Error::config("projectName", format!("invalid project name '{}'", requested)))?;

        let rows = Self::rows_path(&config.jobs.rows_dir, request);
        let feeder = ListFeeder::from_json_file(&rows).await?;
        let orchestrator = ArchivingOrchestrator::from_config(&config).await?;
        Ok((orchestrator, Box::new(feeder)))
    }
}

/// Copies `source_root/{project}` into `mirror_root/{project}`
///
/// A file is copied when it is missing at the destination or its MD5 differs.
/// Nothing is ever deleted from the mirror.
pub struct MirrorSyncOperation {
    roots: MirrorConfig,
    default_project: String,
}

impl MirrorSyncOperation {
    pub fn new(roots: MirrorConfig, default_project: impl Into<String>) -> Self {
        Self {
            roots,
            default_project: default_project.into(),
        }
    }

    /// Mirror one project folder, returning how many files were copied
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, hashed or copied.
    pub async fn sync_project(&self, project: &str) -> Result<usize> {
        let Some(project) = project_dir_name(project) else {
            return Err(Error::Other(format!("mirror: invalid project name '{}'", project)));
        };
        let source = self.roots.source_root.join(&project);
        let dest = self.roots.mirror_root.join(&project);
        tokio::task::spawn_blocking(move || mirror_tree(&source, &dest))
            .await
            .map_err(|e| Error::Other(format!("mirror task failed: {}", e)))?
    }
}

#[async_trait]
impl JobOperation for MirrorSyncOperation {
    fn name(&self) -> &str {
        MIRROR_OPERATION
    }

    async fn run(&self, request: &JobRequest, _cancel: &CancellationToken) -> Result<()> {
        let project = request.project_name_or(&self.default_project);
        let copied = self.sync_project(project).await?;
        tracing::info!(job_id = %request.job_id, project, copied, "Mirror pass finished");
        Ok(())
    }
}

fn mirror_tree(source: &Path, dest: &Path) -> Result<usize> {
    if !source.is_dir() {
        tracing::debug!(source = %source.display(), "Nothing to mirror");
        return Ok(0);
    }

    let mut copied = 0;
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| Error::Other(format!("mirror walk failed: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Other(format!("mirror path outside source: {}", e)))?;
        let target = dest.join(rel);

        if target.is_file() && md5_file(&target)? == md5_file(entry.path())? {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
        tracing::debug!(file = %rel.display(), "Mirrored file");
        copied += 1;
    }
    Ok(copied)
}

fn md5_file(path: &Path) -> Result<md5::Digest> {
    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(context.compute())
}
