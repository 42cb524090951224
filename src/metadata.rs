//! Metadata: the archival record for one input URL

use crate::context::ArchivingContext;
use crate::media::{FINAL_MEDIA_ID, Media};
use crate::types::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property key holding the URL as fed, when sanitizing rewrote it
pub const ORIGINAL_URL_KEY: &str = "original_url";

/// Property key holding the attribution text for the archived content
pub const CREDIT_STRING_KEY: &str = "credit_string";

/// One archival record
///
/// Created by a [`Feeder`](crate::backends::Feeder) with only a URL, then
/// filled in by every pipeline stage. Records produced by different backends
/// are combined with [`merge`](Self::merge).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sanitized_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archived_by: Option<String>,
    #[serde(default)]
    media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_media: Option<Media>,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    /// Create a record seeded with a source URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Replace the source URL, forgetting any sanitized form
    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.url = url.into();
        self.sanitized_url = None;
        self
    }

    /// Working URL: the sanitized form when there is one, else the source URL
    pub fn get_url(&self) -> &str {
        self.sanitized_url.as_deref().unwrap_or(&self.url)
    }

    /// The URL as it was fed
    pub fn source_url(&self) -> &str {
        &self.url
    }

    /// Record a sanitized URL
    ///
    /// When it differs from the source URL the source is kept under
    /// `original_url` in the property bag.
    pub fn set_sanitized_url(&mut self, sanitized: impl Into<String>) {
        let sanitized = sanitized.into();
        if sanitized == self.url {
            self.sanitized_url = None;
            return;
        }
        self.properties.insert(
            ORIGINAL_URL_KEY.to_string(),
            serde_json::Value::String(self.url.clone()),
        );
        self.sanitized_url = Some(sanitized);
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn set_content(&mut self, content: impl Into<String>) -> &mut Self {
        self.content = Some(content.into());
        self
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Set the status outright (use [`merge`](Self::merge) to combine records)
    pub fn set_status(&mut self, status: Status) -> &mut Self {
        self.status = status;
        self
    }

    /// Name of the archiver that produced the content, if any
    pub fn archived_by(&self) -> Option<&str> {
        self.archived_by.as_deref()
    }

    /// Mark this record as successfully archived by `archiver`
    pub fn success(&mut self, archiver: impl Into<String>) -> &mut Self {
        self.status = Status::Success;
        self.archived_by = Some(archiver.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Status text written back to tracking stores, e.g. `"http_archiver: success"`
    pub fn status_message(&self) -> String {
        match (&self.status, &self.archived_by) {
            (Status::Success, Some(by)) => format!("{}: {}", by, self.status.label()),
            (status, _) => status.label().to_string(),
        }
    }

    /// Attribution text, when the archiver found one
    pub fn credit_string(&self) -> Option<&str> {
        self.get_str(CREDIT_STRING_KEY).filter(|s| !s.is_empty())
    }

    pub fn set_credit_string(&mut self, credit: impl Into<String>) -> &mut Self {
        self.set(CREDIT_STRING_KEY, credit.into())
    }

    /// Set a property, replacing any previous value
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) -> &mut Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    /// Append a media to the record
    pub fn add_media(&mut self, media: Media) -> &mut Self {
        self.media.push(media);
        self
    }

    /// Top-level media, in the order they were added
    pub fn media(&self) -> &[Media] {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut [Media] {
        &mut self.media
    }

    /// Every media in the record, nested ones included, final media excluded
    pub fn get_all_media(&self) -> Vec<&Media> {
        self.media
            .iter()
            .flat_map(|m| m.all_inner_media(true))
            .filter(|m| m.id() != Some(FINAL_MEDIA_ID))
            .collect()
    }

    /// Visit every media in the record in [`get_all_media`](Self::get_all_media) order
    pub fn for_each_media_mut(&mut self, f: &mut dyn FnMut(&mut Media)) {
        for media in self.media.iter_mut() {
            media.for_each_inner_media_mut(true, &mut |m| {
                if m.id() != Some(FINAL_MEDIA_ID) {
                    f(m);
                }
            });
        }
    }

    pub fn final_media(&self) -> Option<&Media> {
        self.final_media.as_ref()
    }

    pub fn set_final_media(&mut self, mut media: Media) -> &mut Self {
        media.set_id(FINAL_MEDIA_ID);
        self.final_media = Some(media);
        self
    }

    /// Number of ordinary artifacts anywhere in the tree, used as the
    /// row-advancement hint
    pub fn primary_media_count(&self) -> usize {
        self.get_all_media().iter().filter(|m| m.is_primary()).count()
    }

    /// No ordinary artifacts anywhere in the tree and no final media
    pub fn is_empty(&self) -> bool {
        self.final_media.is_none() && !self.get_all_media().iter().any(|m| m.is_primary())
    }

    /// Right-biased union with `other`
    ///
    /// Scalars take the non-empty value, preferring `other`. Media lists
    /// concatenate (`self` first). Property bags overlay with `other` winning.
    /// Status follows [`Status::merged`].
    pub fn merge(&mut self, other: Metadata) -> &mut Self {
        let Metadata {
            url,
            sanitized_url,
            title,
            content,
            timestamp,
            status,
            archived_by,
            media,
            final_media,
            properties,
        } = other;

        if !url.is_empty() {
            self.url = url;
        }
        self.sanitized_url = sanitized_url.or(self.sanitized_url.take());
        self.title = non_empty(title).or(self.title.take());
        self.content = non_empty(content).or(self.content.take());
        self.timestamp = timestamp.or(self.timestamp);
        self.archived_by = non_empty(archived_by).or(self.archived_by.take());
        self.status = self.status.merged(status);
        self.media.extend(media);
        self.final_media = final_media.or(self.final_media.take());
        self.properties.extend(properties);
        self
    }

    /// Fan every media out to the configured storage backends
    ///
    /// Storage failures are logged inside [`Media::store`] and never abort the
    /// remaining media. Returns the number of successful store calls.
    pub async fn store(&mut self, ctx: &ArchivingContext) -> usize {
        let url = self.get_url().to_string();
        let mut media = std::mem::take(&mut self.media);
        let mut stored = 0;
        for m in media.iter_mut() {
            stored += m.store(&url, self, ctx).await;
        }
        self.media = media;
        stored
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_media_and_keeps_success() {
        let mut a = Metadata::new("https://example.com/a");
        a.success("http_archiver").add_media(Media::new("m1.mp4"));

        let mut b = Metadata::new("https://example.com/a");
        b.add_media(Media::new("m2.mp4"));

        a.merge(b);
        let names: Vec<_> = a.media().iter().map(|m| m.filename().to_str().unwrap()).collect();
        assert_eq!(names, ["m1.mp4", "m2.mp4"]);
        assert_eq!(a.status(), Status::Success);
        assert_eq!(a.archived_by(), Some("http_archiver"));
    }

    #[test]
    fn merge_prefers_incoming_non_empty_scalars() {
        let mut a = Metadata::new("https://example.com");
        a.set_title("old").set_content("kept");

        let mut b = Metadata::new("");
        b.set_title("new").set_content("");

        a.merge(b);
        assert_eq!(a.title(), Some("new"));
        assert_eq!(a.content(), Some("kept"));
        assert_eq!(a.get_url(), "https://example.com");
    }

    #[test]
    fn merge_overlays_properties() {
        let mut a = Metadata::new("u");
        a.set("k", "a").set("only_a", 1);
        let mut b = Metadata::new("u");
        b.set("k", "b");
        a.merge(b);
        assert_eq!(a.get_str("k"), Some("b"));
        assert_eq!(a.get("only_a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn sanitized_url_keeps_original() {
        let mut m = Metadata::new("https://t.co/abc");
        m.set_sanitized_url("https://example.com/full");
        assert_eq!(m.get_url(), "https://example.com/full");
        assert_eq!(m.source_url(), "https://t.co/abc");
        assert_eq!(m.get_str(ORIGINAL_URL_KEY), Some("https://t.co/abc"));
    }

    #[test]
    fn unchanged_sanitized_url_records_nothing() {
        let mut m = Metadata::new("https://example.com");
        m.set_sanitized_url("https://example.com");
        assert_eq!(m.get(ORIGINAL_URL_KEY), None);
    }

    #[test]
    fn empty_ignores_auxiliary_media() {
        let mut m = Metadata::new("u");
        assert!(m.is_empty());

        m.add_media(Media::new("t.jpg").with("id", "thumbnail_1"));
        m.add_media(Media::new("s.png").with("id", "screenshot"));
        m.add_media(Media::new("h.html").with("id", "html_metadata"));
        assert!(m.is_empty());

        m.add_media(Media::new("v.mp4"));
        assert!(!m.is_empty());
    }

    #[test]
    fn final_media_makes_record_non_empty_but_is_not_listed() {
        let mut m = Metadata::new("u");
        m.set_final_media(Media::new("index.html"));
        assert!(!m.is_empty());
        assert!(m.get_all_media().is_empty());
    }

    #[test]
    fn get_all_media_flattens_nested_trees() {
        let mut m = Metadata::new("u");
        m.add_media(
            Media::new("v.mp4").with("thumbnails", vec![Media::new("t.jpg").with("id", "thumbnail_1")]),
        );
        m.add_media(Media::new("w.mp4"));
        assert_eq!(m.get_all_media().len(), 3);
        assert_eq!(m.primary_media_count(), 2);
    }

    #[test]
    fn primary_media_count_includes_nested_artifacts() {
        let mut m = Metadata::new("u");
        m.add_media(Media::new("v.mp4").with("variants", vec![Media::new("v-low.mp4")]));
        m.add_media(Media::new("w.mp4"));
        assert_eq!(m.primary_media_count(), 3);
    }

    #[test]
    fn status_message_names_archiver() {
        let mut m = Metadata::new("u");
        assert_eq!(m.status_message(), "");
        m.success("youtubedl_archiver");
        assert_eq!(m.status_message(), "youtubedl_archiver: success");
        m.set_status(Status::NothingArchived);
        assert_eq!(m.status_message(), "nothing archived");
    }

    #[test]
    fn credit_string_ignores_empty() {
        let mut m = Metadata::new("u");
        m.set_credit_string("");
        assert_eq!(m.credit_string(), None);
        m.set_credit_string("@someone");
        assert_eq!(m.credit_string(), Some("@someone"));
    }

    #[test]
    fn serde_roundtrip_keeps_media_tree() {
        let mut m = Metadata::new("https://example.com");
        m.success("x").add_media(Media::new("a.mp4").with("id", "media_1"));
        let back: Metadata = serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back, m);
    }
}
