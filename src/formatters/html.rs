//! Self-contained HTML summary page

use crate::backends::Formatter;
use crate::context::ArchivingContext;
use crate::error::Result;
use crate::media::{FINAL_MEDIA_ID, Media};
use crate::metadata::Metadata;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Renders the finished record into `{url-hash}.html` in the item's temp dir
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlFormatter;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Short stable file stem for a URL
fn url_hash_prefix(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{:x}", digest).chars().take(16).collect()
}

/// Render the record as an HTML document
pub fn render(item: &Metadata) -> String {
    let url = escape(item.get_url());
    let title = escape(item.title().unwrap_or(item.get_url()));

    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html><head><meta charset=\"utf-8\"><title>{}</title></head><body>", title);
    let _ = writeln!(html, "<h1>{}</h1>", title);
    let _ = writeln!(html, "<p><a href=\"{0}\">{0}</a></p>", url);
    let _ = writeln!(html, "<p>Status: {}</p>", escape(&item.status_message()));
    if let Some(ts) = item.timestamp() {
        let _ = writeln!(html, "<p>Published: {}</p>", ts.to_rfc3339());
    }
    if let Some(credit) = item.credit_string() {
        let _ = writeln!(html, "<p>Credit: {}</p>", escape(credit));
    }
    if let Some(content) = item.content() {
        let _ = writeln!(html, "<pre>{}</pre>", escape(content));
    }

    let _ = writeln!(html, "<ul>");
    for media in item.get_all_media() {
        let label = media
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| media.filename().display().to_string());
        let _ = write!(html, "<li>{} <code>{}</code>", escape(&label), escape(media.content_type()));
        for stored in &media.urls {
            let _ = write!(html, " <a href=\"{0}\">{0}</a>", escape(stored));
        }
        let _ = writeln!(html, "</li>");
    }
    let _ = writeln!(html, "</ul>");
    let _ = writeln!(html, "</body></html>");
    html
}

#[async_trait]
impl Formatter for HtmlFormatter {
    fn name(&self) -> &str {
        "html_formatter"
    }

    async fn format(&self, item: &Metadata, ctx: &ArchivingContext) -> Result<Option<Media>> {
        if item.is_empty() {
            return Ok(None);
        }
        tokio::fs::create_dir_all(&ctx.tmp_dir).await?;
        let path = ctx
            .tmp_dir
            .join(format!("{}.html", url_hash_prefix(item.get_url())));
        tokio::fs::write(&path, render(item)).await?;

        Ok(Some(
            Media::new(path)
                .with_content_type("text/html")
                .with("id", FINAL_MEDIA_ID),
        ))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn render_lists_stored_media_urls() {
        let mut item = Metadata::new("https://example.com/?q=<script>");
        let mut media = Media::new("v.mp4").with("id", "media_1");
        media.add_url("proj/media/2_proj_ab.mp4");
        item.success("http_archiver").add_media(media);

        let html = render(&item);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("proj/media/2_proj_ab.mp4"));
        assert!(html.contains("http_archiver: success"));
    }

    #[tokio::test]
    async fn format_writes_file_and_tags_final_media() {
        let tmp = TempDir::new().unwrap();
        let ctx = ArchivingContext::new(Default::default(), Default::default(), tmp.path().into());
        let mut item = Metadata::new("https://example.com/v");
        item.add_media(Media::new("v.mp4"));

        let media = HtmlFormatter.format(&item, &ctx).await.unwrap().unwrap();
        assert_eq!(media.id(), Some(FINAL_MEDIA_ID));
        assert_eq!(media.content_type(), "text/html");
        assert!(!media.is_primary());
        let body = tokio::fs::read_to_string(media.filename()).await.unwrap();
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert_eq!(media.filename().extension().unwrap(), "html");
    }

    #[tokio::test]
    async fn empty_record_has_nothing_to_format() {
        let tmp = TempDir::new().unwrap();
        let ctx = ArchivingContext::new(Default::default(), Default::default(), tmp.path().into());
        let item = Metadata::new("https://example.com/v");
        assert!(HtmlFormatter.format(&item, &ctx).await.unwrap().is_none());
    }
}
