//! Backend capability contracts and the configured backend set
//!
//! The orchestrator depends only on the traits in this module. Concrete
//! backends live in [`archivers`](crate::archivers),
//! [`enrichers`](crate::enrichers), [`storages`](crate::storages),
//! [`databases`](crate::databases), [`feeders`](crate::feeders) and
//! [`formatters`](crate::formatters); [`Backends::from_config`] picks them by
//! name from an explicit configuration list.

mod traits;

pub use traits::{
    ArchiveOutcome, Archiver, Database, Enricher, FeedItem, Feeder, Formatter, Storage,
    StoredObject,
};

use crate::archivers::{HttpArchiver, YtDlpArchiver};
use crate::config::{
    ArchiverConfig, Config, DatabaseConfig, EnricherConfig, FormatterConfig, StorageConfig,
};
use crate::context::StorageSet;
use crate::databases::{LogDatabase, SqliteDatabase};
use crate::enrichers::{DurationEnricher, HashEnricher, ThumbnailEnricher};
use crate::error::{Error, Result};
use crate::formatters::HtmlFormatter;
use crate::storages::LocalStorage;
use std::sync::Arc;

/// The active backend set for one orchestrator
#[derive(Clone, Default)]
pub struct Backends {
    /// Tried in order until one succeeds
    pub archivers: Vec<Arc<dyn Archiver>>,
    /// Run in order after archiving
    pub enrichers: Vec<Arc<dyn Enricher>>,
    /// Storage destinations per media bucket
    pub storages: StorageSet,
    /// Notified of every lifecycle transition
    pub databases: Vec<Arc<dyn Database>>,
    /// Produces the final composite media
    pub formatter: Option<Arc<dyn Formatter>>,
    /// Asked for attribution when the winning archiver found none
    pub credit_fallback: Option<Arc<dyn Archiver>>,
}

impl Backends {
    /// Instantiate every configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be constructed (HTTP client
    /// setup, SQLite open/migration) or the credit fallback is not among the
    /// configured archivers.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let b = &config.backends;

        let mut archivers: Vec<Arc<dyn Archiver>> = Vec::with_capacity(b.archivers.len());
        for archiver in &b.archivers {
            let archiver: Arc<dyn Archiver> = match archiver {
                ArchiverConfig::HttpArchiver(c) => {
                    Arc::new(HttpArchiver::new(c.clone(), config.retry.clone())?)
                }
                ArchiverConfig::YtDlpArchiver(c) => Arc::new(YtDlpArchiver::new(c.clone())),
            };
            archivers.push(archiver);
        }

        let enrichers = b
            .enrichers
            .iter()
            .map(|e| -> Arc<dyn Enricher> {
                match e {
                    EnricherConfig::HashEnricher { chunk_size } => {
                        Arc::new(HashEnricher::new(*chunk_size))
                    }
                    EnricherConfig::DurationEnricher { ffprobe_path } => {
                        Arc::new(DurationEnricher::new(ffprobe_path.clone()))
                    }
                    EnricherConfig::ThumbnailEnricher { ffmpeg_path, width } => {
                        Arc::new(ThumbnailEnricher::new(ffmpeg_path.clone(), *width))
                    }
                }
            })
            .collect();

        let build_storages = |list: &[StorageConfig]| -> Vec<Arc<dyn Storage>> {
            list.iter()
                .map(|s| -> Arc<dyn Storage> {
                    match s {
                        StorageConfig::LocalStorage(c) => {
                            Arc::new(LocalStorage::new(c.clone(), config.retry.clone()))
                        }
                    }
                })
                .collect()
        };
        let storages = StorageSet {
            primary: build_storages(&b.storages),
            thumbnail: build_storages(&b.thumbnail_storages),
            html_metadata: build_storages(&b.html_metadata_storages),
            screenshot: build_storages(&b.screenshot_storages),
        };

        let mut databases: Vec<Arc<dyn Database>> = Vec::with_capacity(b.databases.len());
        for db in &b.databases {
            let db: Arc<dyn Database> = match db {
                DatabaseConfig::Sqlite { path, use_cache } => {
                    Arc::new(SqliteDatabase::new(path, *use_cache).await?)
                }
                DatabaseConfig::Log => Arc::new(LogDatabase),
            };
            databases.push(db);
        }

        let formatter = b.formatter.as_ref().map(|f| -> Arc<dyn Formatter> {
            match f {
                FormatterConfig::Html => Arc::new(HtmlFormatter),
            }
        });

        let credit_fallback = match &b.credit_fallback {
            None => None,
            Some(name) => match archivers.iter().find(|a| a.name() == name) {
                Some(a) => Some(Arc::clone(a)),
                None if archivers.is_empty() => None,
                None => {
                    return Err(Error::config(
                        "backends.credit_fallback",
                        format!("archiver '{}' is not configured", name),
                    ));
                }
            },
        };

        Ok(Self {
            archivers,
            enrichers,
            storages,
            databases,
            formatter,
            credit_fallback,
        })
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("archivers", &self.archivers.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("enrichers", &self.enrichers.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("storages", &self.storages)
            .field("databases", &self.databases.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("formatter", &self.formatter.as_ref().map(|f| f.name()))
            .field("credit_fallback", &self.credit_fallback.as_ref().map(|a| a.name()))
            .finish()
    }
}
