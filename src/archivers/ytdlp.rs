//! `yt-dlp` based archiver
//!
//! Runs the external `yt-dlp` binary with `-J --no-simulate` so that it both
//! downloads into the item's temp directory and prints the info document on
//! stdout. The same binary serves as the attribution fallback with
//! `--skip-download`.

use crate::backends::{ArchiveOutcome, Archiver};
use crate::config::YtDlpConfig;
use crate::context::ArchivingContext;
use crate::error::{Error, Result};
use crate::media::Media;
use crate::metadata::Metadata;
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// yt-dlp exits with this code once `--max-downloads` is reached
const MAX_DOWNLOADS_REACHED: i32 = 101;

/// Archiver backed by the external `yt-dlp` binary
pub struct YtDlpArchiver {
    binary_path: Option<PathBuf>,
    livestreams: bool,
    max_downloads: usize,
    timeout: Duration,
}

impl YtDlpArchiver {
    /// Use the configured binary, or search PATH for `yt-dlp`
    pub fn new(config: YtDlpConfig) -> Self {
        let binary_path = config
            .binary_path
            .or_else(|| which::which("yt-dlp").ok());
        Self {
            binary_path,
            livestreams: config.livestreams,
            max_downloads: config.max_downloads.max(1),
            timeout: config.timeout,
        }
    }

    /// Whether a binary was found
    pub fn is_available(&self) -> bool {
        self.binary_path.is_some()
    }

    async fn run(&self, binary: &Path, args: &[&str], url: &str, cwd: &Path) -> Result<Value> {
        tokio::fs::create_dir_all(cwd).await?;
        let mut cmd = Command::new(binary);
        cmd.args(args).arg("--").arg(url).current_dir(cwd).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::ExternalTool(format!("yt-dlp timeout after {:?}", self.timeout)))?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let code = output.status.code();
        if !output.status.success() && code != Some(MAX_DOWNLOADS_REACHED) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "yt-dlp exited with {:?}: {}",
                code,
                stderr.lines().last().unwrap_or_default()
            )));
        }

        // -J prints one JSON document per line; the last one describes the whole URL
        let stdout = String::from_utf8_lossy(&output.stdout);
        let doc = stdout
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| Error::ExternalTool("yt-dlp printed no info document".to_string()))?;
        Ok(serde_json::from_str(doc)?)
    }
}

/// Build a record from a yt-dlp info document
///
/// Returns `None` when the item is a live stream and live streams are
/// disabled, or when no downloaded file can be located.
pub fn parse_info(info: &Value, url: &str, livestreams: bool, tmp_dir: &Path) -> Option<Metadata> {
    if !livestreams && info.get("is_live").and_then(Value::as_bool).unwrap_or(false) {
        tracing::info!(url, "Skipping live stream");
        return None;
    }

    let entries: Vec<&Value> = match info.get("entries").and_then(Value::as_array) {
        Some(list) => list.iter().collect(),
        None => vec![info],
    };

    let mut item = Metadata::new(url);
    apply_info_fields(&mut item, info);

    for entry in entries {
        let Some(file) = downloaded_file(entry, tmp_dir) else {
            continue;
        };
        let mut media = Media::new(file);
        for key in ["duration", "original_url", "fulltitle", "upload_date", "webpage_url"] {
            if let Some(value) = entry.get(key).filter(|v| !v.is_null()) {
                media.set(key, value.clone());
            }
        }
        item.add_media(media);
    }

    if item.media().is_empty() {
        return None;
    }
    item.success("youtubedl_archiver");
    Some(item)
}

/// Copy title, description, timestamp, and uploader onto `item`
fn apply_info_fields(item: &mut Metadata, info: &Value) {
    let text = |key: &str| info.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    if let Some(title) = text("title") {
        item.set_title(title);
    }
    if let Some(description) = text("description") {
        item.set_content(description);
    }
    if let Some(ts) = info.get("timestamp").and_then(Value::as_f64)
        && let Some(dt) = DateTime::from_timestamp(ts as i64, 0)
    {
        item.set_timestamp(dt);
    }
    if let Some(credit) = text("uploader").or_else(|| text("channel")).or_else(|| text("creator")) {
        item.set_credit_string(credit);
    }
}

/// Locate the file yt-dlp wrote for one entry
fn downloaded_file(entry: &Value, tmp_dir: &Path) -> Option<PathBuf> {
    let candidate = entry
        .get("requested_downloads")
        .and_then(Value::as_array)
        .and_then(|d| d.first())
        .and_then(|d| d.get("filepath"))
        .or_else(|| entry.get("filepath"))
        .or_else(|| entry.get("_filename"))
        .and_then(Value::as_str)?;
    let path = PathBuf::from(candidate);
    let path = if path.is_absolute() { path } else { tmp_dir.join(path) };
    path.exists().then_some(path)
}

#[async_trait]
impl Archiver for YtDlpArchiver {
    fn name(&self) -> &str {
        "youtubedl_archiver"
    }

    async fn setup(&self) -> Result<()> {
        if self.binary_path.is_none() {
            return Err(Error::NotSupported("yt-dlp binary not found".to_string()));
        }
        Ok(())
    }

    async fn download(&self, item: &Metadata, ctx: &ArchivingContext) -> ArchiveOutcome {
        let Some(binary) = &self.binary_path else {
            tracing::warn!("yt-dlp binary not found, declining");
            return ArchiveOutcome::Declined;
        };

        let url = item.get_url();
        let max_downloads = self.max_downloads.to_string();
        let args = [
            "-J",
            "--no-simulate",
            "--no-progress",
            "--max-downloads",
            max_downloads.as_str(),
            "-o",
            "%(id)s.%(ext)s",
        ];
        match self.run(binary, &args, url, &ctx.tmp_dir).await {
            Ok(info) => match parse_info(&info, url, self.livestreams, &ctx.tmp_dir) {
                Some(result) => ArchiveOutcome::Archived(result),
                None => ArchiveOutcome::Declined,
            },
            Err(e) => {
                // Unsupported URLs are the common case, not a failure
                tracing::debug!(url, error = %e, "yt-dlp could not archive URL");
                ArchiveOutcome::Declined
            }
        }
    }

    async fn fetch_credit(&self, item: &mut Metadata, ctx: &ArchivingContext) -> Result<()> {
        let binary = self
            .binary_path
            .as_deref()
            .ok_or_else(|| Error::NotSupported("yt-dlp binary not found".to_string()))?;
        let url = item.get_url().to_string();
        let info = self
            .run(binary, &["-J", "--skip-download"], &url, &ctx.tmp_dir)
            .await?;

        let mut credit = Metadata::default();
        apply_info_fields(&mut credit, &info);
        if let Some(c) = credit.credit_string() {
            item.set_credit_string(c.to_string());
        }
        if item.title().is_none()
            && let Some(title) = credit.title()
        {
            item.set_title(title.to_string());
        }
        Ok(())
    }
}
