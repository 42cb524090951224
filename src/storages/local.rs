//! Local directory storage

use crate::backends::{Storage, StoredObject};
use crate::config::{LocalStorageConfig, RetryConfig};
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::media::Media;
use crate::metadata::Metadata;
use crate::retry::with_retry;
use crate::types::NamingConvention;
use crate::utils::{clean_string, project_dir_name};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::path::{Path, PathBuf};

/// Copies media into `save_to/{project}/[{folder}/]{bucket}/{name}`
///
/// Names follow the project's [`NamingConvention`] using the fields the
/// orchestrator stamps on every media (`row`, `uar`, `name_prefix`, `title`,
/// `timestamp`).
pub struct LocalStorage {
    name: String,
    save_to: PathBuf,
    save_absolute: bool,
    retry: RetryConfig,
}

impl LocalStorage {
    pub fn new(config: LocalStorageConfig, retry: RetryConfig) -> Self {
        Self {
            name: config.name.unwrap_or_else(|| "local_storage".to_string()),
            save_to: config.save_to,
            save_absolute: config.save_absolute,
            retry,
        }
    }

    /// Destination path relative to `save_to`
    ///
    /// Every component is a cleaned single name, so the key never leaves
    /// `save_to`.
    pub fn key_for(&self, media: &Media, ctx: &ArchivingContext) -> PathBuf {
        let project = project_dir_name(&ctx.project.project_name)
            .unwrap_or_else(|| UNNAMED_PROJECT.to_string());
        let mut key = PathBuf::from(project);
        if let Some(folder) = ctx.row.folder.as_deref().filter(|f| !f.is_empty()) {
            key.push(clean_string(folder));
        }
        key.push(media.bucket().folder());
        key.push(file_name_for(media, ctx));
        key
    }
}

const UNNAMED_PROJECT: &str = "noname";

/// Zero-based position encoded in ids like `media_3` or `thumbnail_2`
fn positional_index(media: &Media) -> usize {
    media
        .id()
        .and_then(|id| id.rsplit('_').next())
        .and_then(|n| n.parse::<usize>().ok())
        .map(|n| n.saturating_sub(1))
        .unwrap_or(0)
}

fn file_name_for(media: &Media, ctx: &ArchivingContext) -> String {
    let ext = extension_of(media.filename());
    let row = media
        .get("row")
        .and_then(|p| p.as_value())
        .and_then(|v| v.as_u64())
        .map(|r| r as usize)
        .unwrap_or(ctx.row.row)
        + positional_index(media);
    let uar = media.get_str("uar").unwrap_or_default();

    match ctx.project.naming_convention {
        NamingConvention::OnlyUar => format!("{}_{}{}", row, uar, ext),
        NamingConvention::PrefixAndUar => {
            let prefix = media
                .get_str("name_prefix")
                .unwrap_or(ctx.row.name_prefix.as_str());
            format!("{}_{}_{}{}", row, prefix, uar, ext)
        }
        NamingConvention::DateTitle => {
            let timestamp = media
                .get_str("timestamp")
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let title = media.get_str("title").unwrap_or_default();
            clean_string(&format!("{} EST {}_{}{}", est_date(timestamp), title, row, ext))
        }
    }
}

/// Calendar date in a fixed UTC-5 offset
fn est_date(timestamp: DateTime<Utc>) -> String {
    match FixedOffset::west_opt(5 * 3600) {
        Some(est) => timestamp.with_timezone(&est).format("%Y-%m-%d").to_string(),
        None => timestamp.format("%Y-%m-%d").to_string(),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(
        &self,
        media: &Media,
        _url: &str,
        _item: &Metadata,
        ctx: &ArchivingContext,
    ) -> Result<StoredObject> {
        if media.filename().as_os_str().is_empty() {
            return Err(Error::backend(&self.name, "media has no local file"));
        }

        let key = self.key_for(media, ctx);
        let dest = self.save_to.join(&key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (src, dest_path) = (media.filename(), dest.as_path());
        let bytes = with_retry(&self.retry, &format!("{} copy", self.name), move || async move {
            tokio::fs::copy(src, dest_path).await.map_err(Error::from)
        })
        .await?;

        tracing::debug!(
            storage = %self.name,
            src = %media.filename().display(),
            dest = %dest.display(),
            bytes,
            "Copied media"
        );

        let url = if self.save_absolute {
            std::path::absolute(&dest)?.display().to_string()
        } else {
            key.display().to_string()
        };
        Ok(StoredObject::new(url).with_property("key", key.display().to_string()))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StorageSet;
    use crate::types::{ProjectDetails, RowContext};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx(convention: NamingConvention, row: usize) -> ArchivingContext {
        let project = ProjectDetails {
            project_name: "proj".into(),
            naming_convention: convention,
            ..Default::default()
        };
        ArchivingContext::new(Arc::new(StorageSet::default()), Arc::new(project), PathBuf::from("/tmp"))
            .for_item(
                PathBuf::from("/tmp"),
                RowContext {
                    row,
                    name_prefix: "pfx".into(),
                    folder: None,
                },
            )
    }

    fn storage(root: &Path) -> LocalStorage {
        LocalStorage::new(
            LocalStorageConfig {
                name: None,
                save_to: root.to_path_buf(),
                save_absolute: false,
            },
            RetryConfig::default(),
        )
    }

    #[test]
    fn only_uar_naming_uses_row_plus_position() {
        let media = Media::new("clip.mp4")
            .with("id", "media_3")
            .with("row", 10usize)
            .with("uar", "proj_ab");
        let name = file_name_for(&media, &ctx(NamingConvention::OnlyUar, 10));
        assert_eq!(name, "12_proj_ab.mp4");
    }

    #[test]
    fn prefix_and_uar_naming() {
        let media = Media::new("clip.webm")
            .with("id", "media_1")
            .with("row", 4usize)
            .with("uar", "proj_zz")
            .with("name_prefix", "batch7");
        let name = file_name_for(&media, &ctx(NamingConvention::PrefixAndUar, 4));
        assert_eq!(name, "4_batch7_proj_zz.webm");
    }

    #[test]
    fn date_title_naming_uses_eastern_date() {
        let media = Media::new("clip.mp4")
            .with("id", "media_2")
            .with("row", 7usize)
            .with("title", "Breaking: news?")
            .with("timestamp", "2024-03-02T03:00:00+00:00");
        let name = file_name_for(&media, &ctx(NamingConvention::DateTitle, 7));
        assert_eq!(name, "2024-03-01 EST Breaking news_8.mp4");
    }

    #[test]
    fn key_groups_by_bucket_folder() {
        let tmp = TempDir::new().unwrap();
        let s = storage(tmp.path());
        let thumb = Media::new("t.jpg")
            .with("id", "thumbnail_1")
            .with("uar", "proj_qq")
            .with("row", 2usize);
        let key = s.key_for(&thumb, &ctx(NamingConvention::OnlyUar, 2));
        assert_eq!(key, PathBuf::from("proj/thumbnails/2_proj_qq.jpg"));
    }

    #[tokio::test]
    async fn store_copies_file_and_reports_relative_url() {
        let src_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("clip.mp4");
        tokio::fs::write(&src, b"video-bytes").await.unwrap();

        let media = Media::new(&src)
            .with("id", "media_1")
            .with("row", 3usize)
            .with("uar", "proj_ab");
        let item = Metadata::new("https://example.com/v");
        let object = storage(dest_dir.path())
            .store(&media, item.get_url(), &item, &ctx(NamingConvention::OnlyUar, 3))
            .await
            .unwrap();

        assert_eq!(object.url, "proj/media/3_proj_ab.mp4");
        let copied = tokio::fs::read(dest_dir.path().join(&object.url)).await.unwrap();
        assert_eq!(copied, b"video-bytes");
    }

    #[tokio::test]
    async fn project_name_cannot_escape_save_to() {
        let tmp = TempDir::new().unwrap();
        let save_to = tmp.path().join("archive");
        let src = tmp.path().join("clip.mp4");
        tokio::fs::write(&src, b"video-bytes").await.unwrap();

        let media = Media::new(&src)
            .with("id", "media_1")
            .with("row", 1usize)
            .with("uar", "u_ab");
        let item = Metadata::new("https://example.com/v");
        for project_name in ["../escaped", "/escaped", ".."] {
            let project = ProjectDetails {
                project_name: project_name.into(),
                ..Default::default()
            };
            let ctx = ArchivingContext::new(Arc::new(StorageSet::default()), Arc::new(project), tmp.path().into());
            let object = storage(&save_to).store(&media, item.get_url(), &item, &ctx).await.unwrap();

            let written = std::path::absolute(save_to.join(&object.url)).unwrap();
            assert!(written.starts_with(&save_to), "{project_name} wrote to {}", written.display());
            assert!(written.is_file());
        }
        assert!(!tmp.path().join("escaped").exists());
        assert!(save_to.join("..escaped/media/1_u_ab.mp4").is_file());
        assert!(save_to.join("noname/media/1_u_ab.mp4").is_file());
    }

    #[tokio::test]
    async fn store_fails_for_missing_source() {
        let dest_dir = TempDir::new().unwrap();
        let media = Media::new("/definitely/not/here.mp4").with("uar", "x");
        let item = Metadata::new("https://example.com/v");
        let result = storage(dest_dir.path())
            .store(&media, item.get_url(), &item, &ctx(NamingConvention::OnlyUar, 1))
            .await;
        assert!(result.is_err());
    }
}
