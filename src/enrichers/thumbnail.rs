//! Video thumbnails via `ffmpeg`

use crate::backends::Enricher;
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::media::Media;
use crate::metadata::Metadata;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// ffmpeg processes running at once for one item
const MAX_CONCURRENT_EXTRACTIONS: usize = 4;

/// Extracts one frame from each top-level video and attaches it as a nested
/// `thumbnails` list (ids `thumbnail_1`, …), routed to the thumbnail storages
pub struct ThumbnailEnricher {
    binary_path: Option<PathBuf>,
    width: u32,
}

impl ThumbnailEnricher {
    /// Use the configured binary, or search PATH for `ffmpeg`
    pub fn new(binary_path: Option<PathBuf>, width: u32) -> Self {
        Self {
            binary_path: binary_path.or_else(|| which::which("ffmpeg").ok()),
            width: width.max(16),
        }
    }

    async fn extract_frame(&self, binary: &Path, video: &Path, at: f64, out: &Path) -> Result<()> {
        let output = Command::new(binary)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-ss")
            .arg(format!("{:.3}", at))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-vf"])
            .arg(format!("scale={}:-2", self.width))
            .arg(out)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() || !out.exists() {
            return Err(Error::ExternalTool(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Seek position for the frame: a second in, or halfway for very short clips
fn seek_position(duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 => (d / 2.0).min(1.0),
        _ => 0.0,
    }
}

fn thumbnail_path(tmp_dir: &Path, video: &Path, index: usize) -> PathBuf {
    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("media");
    tmp_dir.join(format!("{}_thumbnail_{}.jpg", stem, index))
}

#[async_trait]
impl Enricher for ThumbnailEnricher {
    fn name(&self) -> &str {
        "thumbnail_enricher"
    }

    async fn enrich(&self, item: &mut Metadata, ctx: &ArchivingContext) -> Result<()> {
        let Some(binary) = &self.binary_path else {
            tracing::warn!("ffmpeg not found, skipping thumbnails");
            return Ok(());
        };
        tokio::fs::create_dir_all(&ctx.tmp_dir).await?;

        let pending: Vec<(usize, PathBuf, f64, PathBuf)> = item
            .media()
            .iter()
            .enumerate()
            .filter(|(_, media)| media.is_video() && media.get("thumbnails").is_none())
            .map(|(index, media)| {
                let duration = media
                    .get("duration")
                    .and_then(|p| p.as_value())
                    .and_then(|v| v.as_f64());
                (
                    index,
                    media.filename().to_path_buf(),
                    seek_position(duration),
                    thumbnail_path(&ctx.tmp_dir, media.filename(), index + 1),
                )
            })
            .collect();

        let extracted: Vec<(usize, PathBuf, Result<()>)> = stream::iter(pending)
            .map(|(index, video, at, out)| async move {
                let result = self.extract_frame(binary, &video, at, &out).await;
                if let Err(e) = &result {
                    tracing::warn!(file = %video.display(), error = %e, "Could not extract thumbnail");
                }
                (index, out, result)
            })
            .buffer_unordered(MAX_CONCURRENT_EXTRACTIONS)
            .collect()
            .await;

        let slots = item.media_mut();
        for (index, out, result) in extracted {
            if result.is_ok()
                && let Some(media) = slots.get_mut(index)
            {
                let thumb = Media::new(out)
                    .with_content_type("image/jpeg")
                    .with("id", "thumbnail_1");
                media.set("thumbnails", vec![thumb]);
            }
        }
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_position_stays_inside_short_clips() {
        assert_eq!(seek_position(None), 0.0);
        assert_eq!(seek_position(Some(0.5)), 0.25);
        assert_eq!(seek_position(Some(120.0)), 1.0);
    }

    #[test]
    fn thumbnail_names_follow_video_stem() {
        let p = thumbnail_path(Path::new("/tmp/x"), Path::new("/tmp/x/abc.mp4"), 2);
        assert_eq!(p, PathBuf::from("/tmp/x/abc_thumbnail_2.jpg"));
    }

    #[tokio::test]
    async fn missing_binary_leaves_media_untouched() {
        let tmp = tempfile::TempDir::new().unwrap();
        let enricher = ThumbnailEnricher {
            binary_path: None,
            width: 320,
        };
        let mut item = Metadata::new("https://example.com");
        item.add_media(Media::new("v.mp4"));
        let ctx = ArchivingContext::new(Default::default(), Default::default(), tmp.path().into());
        enricher.enrich(&mut item, &ctx).await.unwrap();
        assert_eq!(item.get_all_media().len(), 1);
    }

    #[cfg(feature = "live-tests")]
    #[tokio::test]
    async fn live_thumbnail_from_generated_clip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clip = tmp.path().join("clip.mp4");
        let status = Command::new("ffmpeg")
            .args(["-y", "-f", "lavfi", "-i", "testsrc=duration=2:size=320x240:rate=10"])
            .arg(&clip)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let mut item = Metadata::new("https://example.com");
        item.add_media(Media::new(&clip));
        let ctx = ArchivingContext::new(Default::default(), Default::default(), tmp.path().into());
        ThumbnailEnricher::new(None, 160).enrich(&mut item, &ctx).await.unwrap();

        let all = item.get_all_media();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id(), Some("thumbnail_1"));
        assert!(all[1].filename().exists());
    }
}
