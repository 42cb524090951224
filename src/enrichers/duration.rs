//! Media duration via `ffprobe`

use super::{apply_by_position, media_positions};
use crate::backends::Enricher;
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::utils::format_duration;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Sets `duration` (seconds) and `duration_str` (`H:MM:SS[.ffffff]`) on audio
/// and video media
pub struct DurationEnricher {
    binary_path: Option<PathBuf>,
}

impl DurationEnricher {
    /// Use the configured binary, or search PATH for `ffprobe`
    pub fn new(binary_path: Option<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.or_else(|| which::which("ffprobe").ok()),
        }
    }

    async fn probe(&self, binary: &Path, file: &Path) -> Result<f64> {
        let output = Command::new(binary)
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(file)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// ffprobe prints the duration alone on one line, or `N/A`
fn parse_probe_output(stdout: &str) -> Result<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| Error::ExternalTool(format!("ffprobe returned no duration: {:?}", stdout.trim())))
}

#[async_trait]
impl Enricher for DurationEnricher {
    fn name(&self) -> &str {
        "duration_enricher"
    }

    async fn enrich(&self, item: &mut Metadata, _ctx: &ArchivingContext) -> Result<()> {
        let Some(binary) = &self.binary_path else {
            tracing::warn!("ffprobe not found, skipping duration enrichment");
            return Ok(());
        };

        let targets = media_positions(item, |m| m.is_video() || m.is_audio());
        let mut durations = HashMap::new();
        for (pos, path) in targets {
            match self.probe(binary, &path).await {
                Ok(seconds) => {
                    durations.insert(pos, seconds);
                }
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "Could not read duration"),
            }
        }

        apply_by_position(item, |m, pos| {
            if let Some(seconds) = durations.remove(&pos) {
                if m.get("duration").is_none() {
                    m.set("duration", seconds);
                }
                m.set("duration_str", format_duration(seconds));
            }
        });
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Media;

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_probe_output("12.345000\n").unwrap(), 12.345);
        assert!(parse_probe_output("N/A\n").is_err());
        assert!(parse_probe_output("").is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_a_no_op() {
        let enricher = DurationEnricher { binary_path: None };
        let mut item = Metadata::new("https://example.com");
        item.add_media(Media::new("v.mp4"));
        let ctx = ArchivingContext::new(Default::default(), Default::default(), "/tmp".into());
        enricher.enrich(&mut item, &ctx).await.unwrap();
        assert_eq!(item.media()[0].get("duration_str"), None);
    }
}
