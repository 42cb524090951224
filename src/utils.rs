//! Utility functions for filenames and content types

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Extension → content type table used when a backend did not report one
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("ts", "video/mp2t"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("vtt", "text/vtt"),
    ("srt", "application/x-subrip"),
    ("pdf", "application/pdf"),
    ("wacz", "application/wacz"),
];

/// Guess a content type from a file extension (case-insensitive)
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| *ct)
}

/// Reverse lookup: preferred extension (with dot) for a content type
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim();
    CONTENT_TYPES
        .iter()
        .find(|(_, ct)| ct.eq_ignore_ascii_case(essence))
        .map(|(ext, _)| match *ext {
            "mp4" => ".mp4",
            "jpg" => ".jpg",
            "png" => ".png",
            "gif" => ".gif",
            "webp" => ".webp",
            "mp3" => ".mp3",
            "webm" => ".webm",
            "html" => ".html",
            "mkv" => ".mkv",
            "mov" => ".mov",
            "m4a" => ".m4a",
            "ogg" => ".ogg",
            "wav" => ".wav",
            "pdf" => ".pdf",
            _ => "",
        })
        .filter(|ext| !ext.is_empty())
}

// Literal patterns, checked by the tests below
#[allow(clippy::expect_used)]
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"));
#[allow(clippy::expect_used)]
static REPEATED_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Make a human-readable string safe to use as a filename
///
/// Strips characters that are invalid on common filesystems, collapses
/// whitespace, and caps the length at 200 characters.
///
/// # Examples
///
/// ```
/// use link_archiver::utils::clean_string;
///
/// assert_eq!(clean_string("a/b: c?  d"), "ab c d");
/// ```
pub fn clean_string(s: &str) -> String {
    let stripped = UNSAFE_FILENAME_CHARS.replace_all(s, "");
    let collapsed = REPEATED_WHITESPACE.replace_all(stripped.trim(), " ");
    collapsed.chars().take(200).collect()
}

/// Project name reduced to one safe path component
///
/// Returns `None` when nothing usable is left after [`clean_string`], or the
/// result is made only of dots.
pub fn project_dir_name(name: &str) -> Option<String> {
    let cleaned = clean_string(name);
    (!cleaned.is_empty() && !cleaned.chars().all(|c| c == '.')).then_some(cleaned)
}

/// Extract a filename from an HTTP response
///
/// Tries the Content-Disposition header first (both `filename=` and the RFC 5987
/// `filename*=` form), then the last path segment of the URL. Unlike the stem
/// helpers elsewhere, the extension is kept because it drives content-type
/// detection.
pub fn extract_filename_from_response(response: &reqwest::Response, url: &str) -> String {
    if let Some(content_disposition) = response.headers().get("content-disposition")
        && let Ok(value) = content_disposition.to_str()
        && let Some(name) = filename_from_content_disposition(value)
    {
        return name;
    }

    if let Ok(parsed_url) = url::Url::parse(url)
        && let Some(mut segments) = parsed_url.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        if let Ok(decoded) = urlencoding::decode(last_segment) {
            return clean_string(&decoded);
        }
        return clean_string(last_segment);
    }

    "download".to_string()
}

/// Parse a Content-Disposition header value for a filename
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            // charset'lang'encoded-filename
            if let Some(idx) = encoded.rfind('\'')
                && let Ok(decoded) = urlencoding::decode(&encoded[idx + 1..])
            {
                return Some(clean_string(&decoded));
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            let name = clean_string(name.trim_matches('"'));
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

/// Render seconds the way duration columns expect it: `H:MM:SS` with an
/// optional microsecond fraction
pub fn format_duration(seconds: f64) -> String {
    let total_micros = (seconds.max(0.0) * 1_000_000.0).round() as u64;
    let micros = total_micros % 1_000_000;
    let total_secs = total_micros / 1_000_000;
    let (h, m, s) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
    if micros == 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}:{:02}.{:06}", h, m, s, micros)
    }
}
