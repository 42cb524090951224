//! Core types for link-archiver

use serde::{Deserialize, Serialize};

/// Archival status of one [`Metadata`](crate::metadata::Metadata) record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Created by the feeder, nothing has happened yet
    #[default]
    NotStarted,
    /// Pipeline is running
    InProgress,
    /// At least one archiver produced content
    Success,
    /// Validation error or unhandled failure
    Failure,
    /// Pipeline finished without any usable media
    NothingArchived,
    /// Interrupted by an external signal
    Aborted,
}

impl Status {
    /// Whether this status ends the lifecycle of a record
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failure | Status::NothingArchived | Status::Aborted
        )
    }

    /// Precedence used when two records are merged (higher wins)
    pub fn precedence(&self) -> u8 {
        match self {
            Status::NotStarted => 0,
            Status::InProgress => 1,
            Status::NothingArchived => 2,
            Status::Aborted => 3,
            Status::Failure => 4,
            Status::Success => 5,
        }
    }

    /// Human-readable label written back to the tracking store
    pub fn label(&self) -> &'static str {
        match self {
            Status::NotStarted => "",
            Status::InProgress => "Archive in progress",
            Status::Success => "success",
            Status::Failure => "Archive failed",
            Status::NothingArchived => "nothing archived",
            Status::Aborted => "aborted",
        }
    }

    /// Pick the status that survives a merge; ties go to the incoming status
    pub fn merged(self, incoming: Status) -> Status {
        if incoming.precedence() >= self.precedence() {
            incoming
        } else {
            self
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Storage bucket a media belongs to, decided by its `id` tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaBucket {
    /// Ordinary archived artifact
    Primary,
    /// Auto-generated thumbnail
    Thumbnail,
    /// Rendered-page metadata sidecar
    HtmlMetadata,
    /// Page screenshot
    Screenshot,
}

impl MediaBucket {
    /// All buckets, in fan-out order
    pub const ALL: [MediaBucket; 4] = [
        MediaBucket::Primary,
        MediaBucket::Thumbnail,
        MediaBucket::HtmlMetadata,
        MediaBucket::Screenshot,
    ];

    /// Classify an `id` tag
    pub fn from_id(id: Option<&str>) -> Self {
        match id {
            Some(id) if id.contains("thumbnail") => MediaBucket::Thumbnail,
            Some(id) if id.contains("html_metadata") => MediaBucket::HtmlMetadata,
            Some(id) if id.contains("screenshot") => MediaBucket::Screenshot,
            _ => MediaBucket::Primary,
        }
    }

    /// Folder name storage backends file this bucket under
    pub fn folder(&self) -> &'static str {
        match self {
            MediaBucket::Primary => "media",
            MediaBucket::Thumbnail => "thumbnails",
            MediaBucket::HtmlMetadata => "html_metadata",
            MediaBucket::Screenshot => "screenshots",
        }
    }
}

/// How storage backends name archived files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// `{row}_{uar}{ext}` (default)
    #[default]
    OnlyUar,
    /// `{row}_{name_prefix}_{uar}{ext}`
    PrefixAndUar,
    /// `{date} EST {title}_{row}{ext}`
    DateTitle,
}

/// Named project values resolved once per run and read-only thereafter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    /// Project label, used as the prefix of archival references
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Standard storage layout identifier
    #[serde(default = "default_project_format")]
    pub project_format: String,

    /// File naming convention for stored media
    #[serde(default)]
    pub naming_convention: NamingConvention,
}

impl Default for ProjectDetails {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            project_format: default_project_format(),
            naming_convention: NamingConvention::default(),
        }
    }
}

fn default_project_name() -> String {
    "noname".to_string()
}

fn default_project_format() -> String {
    "vi-gd-gcs-codec".to_string()
}

/// Position of the item being archived inside the tracking store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowContext {
    /// Row number of the item (1-based, header rows included)
    pub row: usize,
    /// Optional prefix used by the `prefix_and_uar` naming convention
    #[serde(default)]
    pub name_prefix: String,
    /// Optional destination sub-folder
    #[serde(default)]
    pub folder: Option<String>,
}

/// External key grouping operations that must not overlap
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
