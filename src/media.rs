//! Media: one retrievable artifact and the tree of artifacts derived from it
//!
//! A [`Media`] owns its nested media through its property bag (a thumbnail
//! list, a rendered screenshot, a sidecar file). Children never point back at
//! their parent, so the tree is acyclic by construction and a depth-first walk
//! ([`Media::all_inner_media`]) visits every node exactly once.

use crate::backends::StoredObject;
use crate::context::ArchivingContext;
use crate::metadata::Metadata;
use crate::types::MediaBucket;
use crate::utils::guess_content_type;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// A value stored in a media property bag
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Property {
    /// Plain JSON value (text, number, flag, object)
    Value(serde_json::Value),
    /// A single nested media
    Media(Box<Media>),
    /// A list of nested media
    MediaList(Vec<Media>),
}

impl Property {
    /// Borrow the plain value, if this is one
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Property::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the value as a string, if it is a JSON string
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(|v| v.as_str())
    }
}

impl From<serde_json::Value> for Property {
    fn from(v: serde_json::Value) -> Self {
        Property::Value(v)
    }
}

impl From<&str> for Property {
    fn from(v: &str) -> Self {
        Property::Value(serde_json::Value::String(v.to_string()))
    }
}

impl From<String> for Property {
    fn from(v: String) -> Self {
        Property::Value(serde_json::Value::String(v))
    }
}

impl From<usize> for Property {
    fn from(v: usize) -> Self {
        Property::Value(serde_json::Value::from(v))
    }
}

impl From<f64> for Property {
    fn from(v: f64) -> Self {
        Property::Value(serde_json::Value::from(v))
    }
}

impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Property::Value(serde_json::Value::Bool(v))
    }
}

impl From<Media> for Property {
    fn from(m: Media) -> Self {
        Property::Media(Box::new(m))
    }
}

impl From<Vec<Media>> for Property {
    fn from(list: Vec<Media>) -> Self {
        Property::MediaList(list)
    }
}

/// One archived file plus everything known about it
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Media {
    filename: PathBuf,
    /// Storage key, when a backend assigned one
    #[serde(default)]
    pub key: Option<String>,
    /// Destination URLs, appended as storage backends persist the file
    #[serde(default)]
    pub urls: Vec<String>,
    /// Open property bag; may hold nested media
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default, rename = "mimetype")]
    content_type: Option<String>,
    #[serde(skip)]
    guessed_type: OnceLock<String>,
}

impl PartialEq for Media {
    fn eq(&self, other: &Self) -> bool {
        self.filename == other.filename
            && self.key == other.key
            && self.urls == other.urls
            && self.properties == other.properties
            && self.content_type == other.content_type
    }
}

impl Media {
    /// Create a media for a local file
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Builder-style explicit content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Builder-style property setter
    pub fn with(mut self, key: &str, value: impl Into<Property>) -> Self {
        self.set(key, value);
        self
    }

    /// Local file backing this media
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Point this media at another local file
    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) {
        self.filename = filename.into();
        self.guessed_type = OnceLock::new();
    }

    /// Content type, either explicit or guessed from the file extension once
    pub fn content_type(&self) -> &str {
        if let Some(ct) = &self.content_type {
            return ct;
        }
        self.guessed_type.get_or_init(|| {
            if self.filename.as_os_str().is_empty() {
                tracing::warn!("cannot get content type from media without filename");
                return String::new();
            }
            guess_content_type(&self.filename)
                .unwrap_or_default()
                .to_string()
        })
    }

    /// Override the content type
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Video content
    pub fn is_video(&self) -> bool {
        self.content_type().starts_with("video")
    }

    /// Audio content
    pub fn is_audio(&self) -> bool {
        self.content_type().starts_with("audio")
    }

    /// Image content
    pub fn is_image(&self) -> bool {
        self.content_type().starts_with("image")
    }

    /// Set a property, replacing any previous value
    pub fn set(&mut self, key: &str, value: impl Into<Property>) -> &mut Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Look up a property
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Look up a string property
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Property::as_str)
    }

    /// The `id` tag used to route this media to a storage bucket
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    /// Set the `id` tag
    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.set("id", id.into())
    }

    /// Bucket this media is stored under
    pub fn bucket(&self) -> MediaBucket {
        MediaBucket::from_id(self.id())
    }

    /// Whether this is an ordinary archived artifact
    pub fn is_primary(&self) -> bool {
        self.bucket() == MediaBucket::Primary && self.id() != Some(FINAL_MEDIA_ID)
    }

    /// Record a destination URL
    pub fn add_url(&mut self, url: impl Into<String>) {
        self.urls.push(url.into());
    }

    /// Stored iff every primary storage destination contributed a URL
    pub fn is_stored(&self, primary_destinations: usize) -> bool {
        self.urls.len() == primary_destinations
    }

    /// Depth-first walk over this media's tree
    ///
    /// Nested media are found in `Property::Media` and `Property::MediaList`
    /// values. With `include_self` the receiver comes first.
    pub fn all_inner_media(&self, include_self: bool) -> Vec<&Media> {
        let mut out = Vec::new();
        if include_self {
            out.push(self);
        }
        for prop in self.properties.values() {
            match prop {
                Property::Media(m) => out.extend(m.all_inner_media(true)),
                Property::MediaList(list) => {
                    for m in list {
                        out.extend(m.all_inner_media(true));
                    }
                }
                Property::Value(_) => {}
            }
        }
        out
    }

    /// Mutable depth-first walk, visiting nodes in the same order as
    /// [`all_inner_media`](Self::all_inner_media)
    pub fn for_each_inner_media_mut(&mut self, include_self: bool, f: &mut dyn FnMut(&mut Media)) {
        if include_self {
            f(self);
        }
        for prop in self.properties.values_mut() {
            match prop {
                Property::Media(m) => m.for_each_inner_media_mut(true, f),
                Property::MediaList(list) => {
                    for m in list.iter_mut() {
                        m.for_each_inner_media_mut(true, f);
                    }
                }
                Property::Value(_) => {}
            }
        }
    }

    /// Fan this media tree out to the configured storage backends
    ///
    /// The tree is partitioned into four disjoint buckets by `id` tag, and each
    /// bucket goes to its own storage list. A bucket with media but no storages
    /// is skipped with a warning. A failing storage call is logged and does not
    /// stop the remaining calls. Returns how many store calls succeeded.
    pub async fn store(&mut self, url: &str, item: &Metadata, ctx: &ArchivingContext) -> usize {
        let mut stored: Vec<(usize, StoredObject)> = Vec::new();

        {
            let tree = self.all_inner_media(true);
            for bucket in MediaBucket::ALL {
                let members: Vec<(usize, &Media)> = tree
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.bucket() == bucket)
                    .map(|(i, m)| (i, *m))
                    .collect();
                if members.is_empty() {
                    continue;
                }

                let storages = ctx.storages.for_bucket(bucket);
                if storages.is_empty() {
                    tracing::warn!(
                        filename = %self.filename.display(),
                        bucket = ?bucket,
                        "No storages configured for bucket, skipping"
                    );
                    continue;
                }

                for storage in storages {
                    for (idx, media) in &members {
                        match storage.store(media, url, item, ctx).await {
                            Ok(object) => {
                                tracing::debug!(
                                    storage = storage.name(),
                                    url = %object.url,
                                    "Stored media"
                                );
                                stored.push((*idx, object));
                            }
                            Err(e) => {
                                tracing::error!(
                                    storage = storage.name(),
                                    filename = %media.filename.display(),
                                    error = %e,
                                    "Storage backend failed"
                                );
                            }
                        }
                    }
                }
            }
        }

        let count = stored.len();
        let mut position = 0usize;
        self.for_each_inner_media_mut(true, &mut |media| {
            for (_, object) in stored.iter().filter(|(idx, _)| *idx == position) {
                media.add_url(object.url.clone());
                for (key, value) in &object.properties {
                    media.set(key, value.clone());
                }
            }
            position += 1;
        });
        count
    }
}

/// `id` tag carried by the composite media a formatter produces
pub const FINAL_MEDIA_ID: &str = "_final_media";

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Media {
        let thumb = Media::new("thumb.jpg").with("id", "thumbnail_1");
        let a = Media::new("a.png");
        let b = Media::new("b.png");
        Media::new("video.mp4")
            .with("thumbnail", thumb)
            .with("frames", vec![a, b])
            .with("duration", 12.5)
    }

    #[test]
    fn all_inner_media_walks_nested_and_list_properties() {
        let m = tree();
        let all = m.all_inner_media(true);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].filename(), Path::new("video.mp4"));

        let names: Vec<_> = all.iter().map(|m| m.filename().to_path_buf()).collect();
        assert!(names.contains(&PathBuf::from("thumb.jpg")));
        assert!(names.contains(&PathBuf::from("a.png")));
        assert!(names.contains(&PathBuf::from("b.png")));
    }

    #[test]
    fn all_inner_media_without_self() {
        let m = tree();
        assert_eq!(m.all_inner_media(false).len(), 3);
    }

    #[test]
    fn mutable_walk_visits_in_same_order() {
        let mut m = tree();
        let expected: Vec<PathBuf> = m
            .all_inner_media(true)
            .iter()
            .map(|m| m.filename().to_path_buf())
            .collect();
        let mut seen = Vec::new();
        m.for_each_inner_media_mut(true, &mut |inner| seen.push(inner.filename().to_path_buf()));
        assert_eq!(seen, expected);
    }

    #[test]
    fn content_type_is_guessed_from_extension() {
        assert!(Media::new("clip.mp4").is_video());
        assert!(Media::new("song.mp3").is_audio());
        assert!(Media::new("pic.JPG").is_image());
        assert_eq!(Media::new("notes.unknownext").content_type(), "");
        assert_eq!(Media::new("").content_type(), "");
    }

    #[test]
    fn explicit_content_type_wins() {
        let m = Media::new("index.bin").with_content_type("text/html");
        assert_eq!(m.content_type(), "text/html");
    }

    #[test]
    fn set_filename_resets_guess() {
        let mut m = Media::new("clip.mp4");
        assert!(m.is_video());
        m.set_filename("pic.png");
        assert!(m.is_image());
    }

    #[test]
    fn stored_requires_every_primary_destination() {
        let mut m = Media::new("a.mp4");
        assert!(m.is_stored(0), "nothing to store to counts as stored");
        assert!(!m.is_stored(1));
        m.add_url("file:///one");
        assert!(!m.is_stored(2));
        m.add_url("file:///two");
        assert!(m.is_stored(2));
    }

    #[test]
    fn primary_excludes_auxiliary_and_final() {
        assert!(Media::new("a").is_primary());
        assert!(Media::new("a").with("id", "media_2").is_primary());
        assert!(!Media::new("a").with("id", "thumbnail_1").is_primary());
        assert!(!Media::new("a").with("id", "screenshot").is_primary());
        assert!(!Media::new("a").with("id", "html_metadata").is_primary());
        assert!(!Media::new("a").with("id", FINAL_MEDIA_ID).is_primary());
    }

    #[test]
    fn serializes_nested_tree() {
        let m = tree();
        let json = serde_json::to_string(&m).unwrap();
        let back: Media = serde_json::from_str(&json).unwrap();
        assert_eq!(back.all_inner_media(true).len(), 4);
        assert_eq!(back.get("duration"), Some(&Property::from(12.5)));
    }
}
