//! In-memory tracking rows

use crate::backends::{FeedItem, Feeder};
use crate::error::Result;
use crate::metadata::Metadata;
use crate::types::RowContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One row of a tracking store
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRow {
    /// Link to archive; blank rows are skipped
    #[serde(default)]
    pub url: String,
    /// Existing status; rows that already have one are skipped
    #[serde(default)]
    pub status: String,
    /// Optional file name prefix
    #[serde(default)]
    pub name_prefix: String,
    /// Optional destination sub-folder
    #[serde(default)]
    pub folder: Option<String>,
}

impl TrackingRow {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Feeds rows of a tracking table in order
///
/// Row numbers are 1-based and count the header rows, matching what a
/// spreadsheet shows. After each item the orchestrator reports how many
/// primary media it produced; the feeder then skips `max(1, offset)` rows so
/// that rows written for extra media are not fed back in.
pub struct ListFeeder {
    name: String,
    rows: Vec<TrackingRow>,
    header_rows: usize,
    cursor: usize,
    last: Option<usize>,
}

impl ListFeeder {
    pub fn new(rows: Vec<TrackingRow>) -> Self {
        Self {
            name: "list_feeder".to_string(),
            rows,
            header_rows: 1,
            cursor: 0,
            last: None,
        }
    }

    /// One row per URL, no statuses
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(urls.into_iter().map(TrackingRow::new).collect())
    }

    /// Load rows from a JSON array of [`TrackingRow`] objects
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON array of rows.
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let rows: Vec<TrackingRow> = serde_json::from_str(&raw)?;
        Ok(Self::new(rows).with_name(format!("list_feeder:{}", path.display())))
    }

    /// Number of header rows above the data (default: 1)
    pub fn with_header_rows(mut self, header_rows: usize) -> Self {
        self.header_rows = header_rows;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Feeder for ListFeeder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_item(&mut self) -> Result<Option<FeedItem>> {
        while self.cursor < self.rows.len() {
            let idx = self.cursor;
            self.cursor += 1;

            let row = &self.rows[idx];
            let url = row.url.trim();
            if url.is_empty() || !row.status.trim().is_empty() {
                continue;
            }

            self.last = Some(idx);
            return Ok(Some(FeedItem {
                item: Metadata::new(url),
                row: RowContext {
                    row: self.header_rows + idx + 1,
                    name_prefix: row.name_prefix.clone(),
                    folder: row.folder.clone(),
                },
            }));
        }
        Ok(None)
    }

    fn set_row_offset(&mut self, offset: usize) {
        if let Some(last) = self.last {
            self.cursor = last + offset.max(1);
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(feeder: &mut ListFeeder, offsets: &[usize]) -> Vec<(String, usize)> {
        let mut out = Vec::new();
        let mut offsets = offsets.iter();
        while let Some(fed) = feeder.next_item().await.unwrap() {
            out.push((fed.item.get_url().to_string(), fed.row.row));
            feeder.set_row_offset(offsets.next().copied().unwrap_or(1));
        }
        out
    }

    #[tokio::test]
    async fn rows_start_after_header() {
        let mut feeder = ListFeeder::from_urls(["https://a.example", "https://b.example"]);
        let fed = drain(&mut feeder, &[]).await;
        assert_eq!(
            fed,
            vec![("https://a.example".to_string(), 2), ("https://b.example".to_string(), 3)]
        );
        assert!(feeder.next_item().await.unwrap().is_none(), "not restartable");
    }

    #[tokio::test]
    async fn skips_blank_and_already_processed_rows() {
        let rows = vec![
            TrackingRow::new(""),
            TrackingRow {
                status: "success".into(),
                ..TrackingRow::new("https://done.example")
            },
            TrackingRow::new("https://todo.example"),
        ];
        let fed = drain(&mut ListFeeder::new(rows), &[]).await;
        assert_eq!(fed, vec![("https://todo.example".to_string(), 4)]);
    }

    #[tokio::test]
    async fn row_offset_skips_rows_used_by_extra_media() {
        let mut feeder = ListFeeder::from_urls(["u1", "u2", "u3", "u4"]);
        // first item produced 3 media, occupying rows 2..=4
        let fed = drain(&mut feeder, &[3, 0]).await;
        assert_eq!(fed, vec![("u1".to_string(), 2), ("u4".to_string(), 5)]);
    }

    #[tokio::test]
    async fn row_context_carries_prefix_and_folder() {
        let rows = vec![TrackingRow {
            name_prefix: "batch".into(),
            folder: Some("week1".into()),
            ..TrackingRow::new("https://a.example")
        }];
        let mut feeder = ListFeeder::new(rows).with_header_rows(2);
        let fed = feeder.next_item().await.unwrap().unwrap();
        assert_eq!(fed.row.row, 3);
        assert_eq!(fed.row.name_prefix, "batch");
        assert_eq!(fed.row.folder.as_deref(), Some("week1"));
    }

    #[tokio::test]
    async fn loads_rows_from_json_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rows.json");
        tokio::fs::write(&path, r#"[{"url": "https://a.example"}, {"url": "https://b.example", "status": "x"}]"#)
            .await
            .unwrap();
        let mut feeder = ListFeeder::from_json_file(&path).await.unwrap();
        assert!(feeder.name().starts_with("list_feeder:"));
        assert_eq!(drain(&mut feeder, &[]).await.len(), 1);
    }
}
