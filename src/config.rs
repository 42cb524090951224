//! Configuration types for link-archiver

use crate::error::{Error, Result};
use crate::types::ProjectDetails;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration
///
/// Fields are organized into sub-configs:
/// - [`project`](ProjectDetails) (project label and naming convention)
/// - [`backends`](BackendsConfig) (which backends run, in which order)
/// - [`jobs`](JobsConfig) (worker pool and dispatcher sizing)
/// - [`retry`](RetryConfig) (backoff for retryable backend I/O)
/// - [`api`](ApiConfig) (job intake endpoint)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Project details resolved once per run
    #[serde(default)]
    pub project: ProjectDetails,

    /// Active backends
    #[serde(default)]
    pub backends: BackendsConfig,

    /// Parent directory for per-item temporary directories (default: "./tmp")
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Job controller sizing
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Retry policy for storage copies and HTTP downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Intake API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectDetails::default(),
            backends: BackendsConfig::default(),
            tmp_dir: default_tmp_dir(),
            jobs: JobsConfig::default(),
            retry: RetryConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Check values serde cannot check on its own
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key when:
    /// - the project name is empty, or contains a path separator or `..`
    /// - the worker pool or dispatcher count is zero
    /// - two backends in the same role share a name
    /// - the credit fallback names an archiver that is not configured
    pub fn validate(&self) -> Result<()> {
        if self.project.project_name.trim().is_empty() {
            return Err(Error::config(
                "project.project_name",
                "project name is required to build archival references",
            ));
        }
        let name = &self.project.project_name;
        if name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::config(
                "project.project_name",
                format!("'{}' must be a single folder name", name),
            ));
        }
        if self.jobs.max_workers == 0 {
            return Err(Error::config("jobs.max_workers", "must be at least 1"));
        }
        if self.jobs.dispatchers == 0 {
            return Err(Error::config("jobs.dispatchers", "must be at least 1"));
        }

        let b = &self.backends;
        check_unique("backends.archivers", b.archivers.iter().map(ArchiverConfig::name))?;
        check_unique("backends.enrichers", b.enrichers.iter().map(EnricherConfig::name))?;
        check_unique("backends.databases", b.databases.iter().map(DatabaseConfig::name))?;
        for (key, list) in [
            ("backends.storages", &b.storages),
            ("backends.thumbnail_storages", &b.thumbnail_storages),
            ("backends.html_metadata_storages", &b.html_metadata_storages),
            ("backends.screenshot_storages", &b.screenshot_storages),
        ] {
            check_unique(key, list.iter().map(StorageConfig::name))?;
        }

        if let Some(fallback) = &b.credit_fallback
            && !b.archivers.is_empty()
            && !b.archivers.iter().any(|a| a.name() == fallback)
        {
            return Err(Error::config(
                "backends.credit_fallback",
                format!("archiver '{}' is not configured", fallback),
            ));
        }
        Ok(())
    }
}

fn check_unique<'a>(key: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::config(key, format!("duplicate backend '{}'", name)));
        }
    }
    Ok(())
}

/// Which backends run, in configured order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Archivers, tried in order until one succeeds
    #[serde(default)]
    pub archivers: Vec<ArchiverConfig>,

    /// Enrichers, all run in order
    #[serde(default)]
    pub enrichers: Vec<EnricherConfig>,

    /// Primary storage destinations
    #[serde(default)]
    pub storages: Vec<StorageConfig>,

    /// Thumbnail destinations
    #[serde(default)]
    pub thumbnail_storages: Vec<StorageConfig>,

    /// Rendered-page metadata destinations
    #[serde(default)]
    pub html_metadata_storages: Vec<StorageConfig>,

    /// Screenshot destinations
    #[serde(default)]
    pub screenshot_storages: Vec<StorageConfig>,

    /// Status tracking and cache backends
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    /// Optional composite-artifact formatter
    #[serde(default)]
    pub formatter: Option<FormatterConfig>,

    /// Archiver asked for attribution when the winning archiver found none
    /// (default: "youtubedl_archiver")
    #[serde(default = "default_credit_fallback")]
    pub credit_fallback: Option<String>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            archivers: vec![],
            enrichers: vec![],
            storages: vec![],
            thumbnail_storages: vec![],
            html_metadata_storages: vec![],
            screenshot_storages: vec![],
            databases: vec![],
            formatter: None,
            credit_fallback: default_credit_fallback(),
        }
    }
}

/// Archiver selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiverConfig {
    /// Direct media links over HTTP
    HttpArchiver(HttpArchiverConfig),
    /// External `yt-dlp` extraction
    #[serde(rename = "youtubedl_archiver")]
    YtDlpArchiver(YtDlpConfig),
}

impl ArchiverConfig {
    pub fn name(&self) -> &str {
        match self {
            ArchiverConfig::HttpArchiver(_) => "http_archiver",
            ArchiverConfig::YtDlpArchiver(_) => "youtubedl_archiver",
        }
    }
}

/// Settings for the direct HTTP archiver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpArchiverConfig {
    /// Request timeout (default: 60 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User agent sent with downloads
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Refuse responses larger than this many bytes (None = unlimited)
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
}

impl Default for HttpArchiverConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            user_agent: default_user_agent(),
            max_size_bytes: None,
        }
    }
}

/// Settings for the `yt-dlp` archiver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YtDlpConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Archive live streams (default: false)
    #[serde(default)]
    pub livestreams: bool,

    /// Maximum number of playlist entries to download (default: 1)
    #[serde(default = "default_max_downloads")]
    pub max_downloads: usize,

    /// Upper bound for one yt-dlp invocation (default: 30 minutes)
    #[serde(default = "default_tool_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            livestreams: false,
            max_downloads: default_max_downloads(),
            timeout: default_tool_timeout(),
        }
    }
}

/// Enricher selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnricherConfig {
    /// SHA-256 of every primary media
    HashEnricher {
        /// Read buffer size (default: 16 MiB)
        #[serde(default = "default_hash_chunk_size")]
        chunk_size: usize,
    },
    /// Media duration via `ffprobe`
    DurationEnricher {
        /// Path to ffprobe (auto-detected if None)
        #[serde(default)]
        ffprobe_path: Option<PathBuf>,
    },
    /// One frame per video via `ffmpeg`
    ThumbnailEnricher {
        /// Path to ffmpeg (auto-detected if None)
        #[serde(default)]
        ffmpeg_path: Option<PathBuf>,
        /// Thumbnail width in pixels; height keeps the aspect ratio (default: 640)
        #[serde(default = "default_thumbnail_width")]
        width: u32,
    },
}

impl EnricherConfig {
    pub fn name(&self) -> &str {
        match self {
            EnricherConfig::HashEnricher { .. } => "hash_enricher",
            EnricherConfig::DurationEnricher { .. } => "duration_enricher",
            EnricherConfig::ThumbnailEnricher { .. } => "thumbnail_enricher",
        }
    }
}

/// Storage selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Copy files into a local directory tree
    LocalStorage(LocalStorageConfig),
}

impl StorageConfig {
    pub fn name(&self) -> &str {
        match self {
            StorageConfig::LocalStorage(c) => c.name.as_deref().unwrap_or("local_storage"),
        }
    }
}

/// Settings for local directory storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Distinguishes several local destinations in logs (default: "local_storage")
    #[serde(default)]
    pub name: Option<String>,

    /// Root directory (default: "./archived")
    #[serde(default = "default_save_to")]
    pub save_to: PathBuf,

    /// Report absolute paths instead of paths relative to `save_to` (default: false)
    #[serde(default)]
    pub save_absolute: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            name: None,
            save_to: default_save_to(),
            save_absolute: false,
        }
    }
}

/// Database selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// SQLite status log and archive cache
    Sqlite {
        /// Database path (default: "./link-archiver.db")
        #[serde(default = "default_database_path")]
        path: PathBuf,
        /// Return stored successes as cache hits (default: true)
        #[serde(default = "default_true")]
        use_cache: bool,
    },
    /// Notifications to the tracing log only
    Log,
}

impl DatabaseConfig {
    pub fn name(&self) -> &str {
        match self {
            DatabaseConfig::Sqlite { .. } => "sqlite_db",
            DatabaseConfig::Log => "log_db",
        }
    }
}

/// Formatter selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatterConfig {
    /// Self-contained HTML page listing every stored media
    Html,
}

/// Job controller sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Concurrent sub-operation executions (default: 5)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Dispatcher loops draining the intake queue (default: 5)
    #[serde(default = "default_dispatchers")]
    pub dispatchers: usize,

    /// Directory holding one tracking-row file per job (default: "./jobs")
    ///
    /// A request for job `J` reads `J.json`, or `J_{sheet}.json` when the
    /// request names a sheet.
    #[serde(default = "default_rows_dir")]
    pub rows_dir: PathBuf,

    /// Destination mirroring run after each archival pass (disabled when unset)
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            dispatchers: default_dispatchers(),
            rows_dir: default_rows_dir(),
            mirror: None,
        }
    }
}

/// Source and destination roots for the mirror pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Root the primary storage writes into
    pub source_root: PathBuf,
    /// Root that receives a copy of each project folder
    pub mirror_root: PathBuf,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Intake API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8090)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_credit_fallback() -> Option<String> {
    Some("youtubedl_archiver".to_string())
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("link-archiver/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_downloads() -> usize {
    1
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_hash_chunk_size() -> usize {
    16 * 1024 * 1024
}

fn default_thumbnail_width() -> u32 {
    640
}

fn default_save_to() -> PathBuf {
    PathBuf::from("./archived")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./link-archiver.db")
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    5
}

fn default_dispatchers() -> usize {
    5
}

fn default_rows_dir() -> PathBuf {
    PathBuf::from("./jobs")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8090))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
