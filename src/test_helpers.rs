//! Shared recording mocks for orchestrator tests

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::backends::{
    ArchiveOutcome, Archiver, Backends, Database, Enricher, Formatter, Storage, StoredObject,
};
use crate::context::{ArchivingContext, StorageSet};
use crate::error::{Error, Result};
use crate::media::Media;
use crate::metadata::Metadata;
use crate::orchestrator::ArchivingOrchestrator;
use crate::types::ProjectDetails;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Append-only call log shared between a mock and the test
#[derive(Clone, Default)]
pub(crate) struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub(crate) fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub(crate) fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.all().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// What a [`MockArchiver`] does when asked to download
#[derive(Clone)]
pub(crate) enum MockBehavior {
    /// Succeed with the given media filenames
    Media(Vec<&'static str>),
    /// Succeed with media and a credit string
    Credited(Vec<&'static str>, &'static str),
    /// Succeed with one media carrying an id-less nested variant
    Nested(&'static str, &'static str),
    Decline,
    Fail,
    /// Sleep, then decline
    Hang(Duration),
}

pub(crate) struct MockArchiver {
    pub(crate) name: &'static str,
    pub(crate) behavior: MockBehavior,
    pub(crate) calls: Calls,
    /// Rewrite applied by `sanitize_url`
    pub(crate) rewrite: Option<(&'static str, &'static str)>,
    /// Credit returned by `fetch_credit`
    pub(crate) credit: Option<&'static str>,
}

impl MockArchiver {
    pub(crate) fn new(name: &'static str, behavior: MockBehavior) -> Self {
        Self {
            name,
            behavior,
            calls: Calls::default(),
            rewrite: None,
            credit: None,
        }
    }
}

#[async_trait]
impl Archiver for MockArchiver {
    fn name(&self) -> &str {
        self.name
    }

    async fn setup(&self) -> Result<()> {
        self.calls.push("setup");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.calls.push("cleanup");
        Ok(())
    }

    fn sanitize_url(&self, url: &str) -> String {
        match self.rewrite {
            Some((from, to)) => url.replace(from, to),
            None => url.to_string(),
        }
    }

    async fn download(&self, item: &Metadata, ctx: &ArchivingContext) -> ArchiveOutcome {
        self.calls.push(format!("download {}", item.get_url()));
        let files = match &self.behavior {
            MockBehavior::Media(files) => files.clone(),
            MockBehavior::Credited(files, _) => files.clone(),
            MockBehavior::Nested(parent, variant) => {
                let (parent, variant) = (ctx.tmp_dir.join(parent), ctx.tmp_dir.join(variant));
                for path in [&parent, &variant] {
                    if tokio::fs::write(path, b"nested").await.is_err() {
                        return ArchiveOutcome::Failed(Error::backend(self.name, "tmp write failed"));
                    }
                }
                let mut result = Metadata::new(item.get_url());
                result
                    .add_media(Media::new(parent).with("variants", vec![Media::new(variant)]))
                    .success(self.name);
                return ArchiveOutcome::Archived(result);
            }
            MockBehavior::Decline => return ArchiveOutcome::Declined,
            MockBehavior::Fail => return ArchiveOutcome::Failed(Error::backend(self.name, "boom")),
            MockBehavior::Hang(d) => {
                tokio::time::sleep(*d).await;
                return ArchiveOutcome::Declined;
            }
        };

        let mut result = Metadata::new(item.get_url());
        for file in files {
            let path = ctx.tmp_dir.join(file);
            if tokio::fs::write(&path, file.as_bytes()).await.is_err() {
                return ArchiveOutcome::Failed(Error::backend(self.name, "tmp write failed"));
            }
            result.add_media(Media::new(path));
        }
        if let MockBehavior::Credited(_, credit) = &self.behavior {
            result.set_credit_string(*credit);
        }
        result.success(self.name);
        ArchiveOutcome::Archived(result)
    }

    async fn fetch_credit(&self, item: &mut Metadata, _ctx: &ArchivingContext) -> Result<()> {
        self.calls.push(format!("fetch_credit {}", item.get_url()));
        if let Some(credit) = self.credit {
            item.set_credit_string(credit);
        }
        Ok(())
    }
}

pub(crate) struct MockStorage {
    pub(crate) name: &'static str,
    pub(crate) calls: Calls,
    /// Fail every store call for a file whose name contains this
    pub(crate) fail_on: Option<&'static str>,
}

impl MockStorage {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Calls::default(),
            fail_on: None,
        }
    }
}

#[async_trait]
impl Storage for MockStorage {
    fn name(&self) -> &str {
        self.name
    }

    async fn store(&self, media: &Media, _url: &str, _item: &Metadata, _ctx: &ArchivingContext) -> Result<StoredObject> {
        let file = media
            .filename()
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.push(format!("store {}", file));
        if let Some(needle) = self.fail_on
            && file.contains(needle)
        {
            return Err(Error::backend(self.name, "disk full"));
        }
        Ok(StoredObject::new(format!("mock://{}/{}", self.name, file)))
    }
}

pub(crate) struct MockDatabase {
    pub(crate) name: &'static str,
    pub(crate) calls: Calls,
    pub(crate) hit: Option<Metadata>,
    pub(crate) fail_done: bool,
}

impl MockDatabase {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Calls::default(),
            hit: None,
            fail_done: false,
        }
    }
}

#[async_trait]
impl Database for MockDatabase {
    fn name(&self) -> &str {
        self.name
    }

    async fn started(&self, _item: &Metadata) -> Result<()> {
        self.calls.push("started");
        Ok(())
    }

    async fn fetch(&self, _item: &Metadata) -> Result<Option<Metadata>> {
        self.calls.push("fetch");
        Ok(self.hit.clone())
    }

    async fn done(&self, item: &Metadata, cached: bool) -> Result<()> {
        self.calls.push(format!("done cached={} {}", cached, item.status_message()));
        if self.fail_done {
            return Err(Error::Database("write failed".into()));
        }
        Ok(())
    }

    async fn failed(&self, _item: &Metadata, reason: &str) -> Result<()> {
        self.calls.push(format!("failed {}", reason));
        Ok(())
    }

    async fn aborted(&self, _item: &Metadata) -> Result<()> {
        self.calls.push("aborted");
        Ok(())
    }
}

/// Tags every primary media with `enriched_by`, or fails
pub(crate) struct MockEnricher {
    pub(crate) calls: Calls,
    pub(crate) fail: bool,
}

#[async_trait]
impl Enricher for MockEnricher {
    fn name(&self) -> &str {
        "mock_enricher"
    }

    async fn enrich(&self, item: &mut Metadata, _ctx: &ArchivingContext) -> Result<()> {
        self.calls.push(format!("enrich {}", item.media().len()));
        if self.fail {
            return Err(Error::ExternalTool("enricher crashed".into()));
        }
        for media in item.media_mut() {
            media.set("enriched_by", "mock_enricher");
        }
        Ok(())
    }
}

/// Writes a tiny text file as the final media
pub(crate) struct MockFormatter;

#[async_trait]
impl Formatter for MockFormatter {
    fn name(&self) -> &str {
        "mock_formatter"
    }

    async fn format(&self, item: &Metadata, ctx: &ArchivingContext) -> Result<Option<Media>> {
        if item.is_empty() {
            return Ok(None);
        }
        let path = ctx.tmp_dir.join("final.txt");
        tokio::fs::write(&path, item.get_url()).await?;
        Ok(Some(Media::new(path)))
    }
}

/// Backends holding one archiver per entry and the given primary storages
pub(crate) fn backends(
    archivers: Vec<Arc<dyn Archiver>>,
    storages: Vec<Arc<dyn Storage>>,
    databases: Vec<Arc<dyn Database>>,
) -> Backends {
    Backends {
        archivers,
        storages: StorageSet {
            primary: storages,
            ..Default::default()
        },
        databases,
        ..Default::default()
    }
}

/// Orchestrator over `backends` with a throwaway temp root
pub(crate) async fn create_test_orchestrator(backends: Backends) -> (ArchivingOrchestrator, TempDir) {
    let tmp = TempDir::new().unwrap();
    let project = ProjectDetails {
        project_name: "proj".into(),
        ..Default::default()
    };
    let orchestrator = ArchivingOrchestrator::new(backends, project, tmp.path().join("work")).await;
    (orchestrator, tmp)
}
