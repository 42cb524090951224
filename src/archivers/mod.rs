//! Archiver backends
//!
//! - [`HttpArchiver`] downloads direct image/video/audio links
//! - [`YtDlpArchiver`] delegates to the external `yt-dlp` binary and is the
//!   default attribution fallback

mod http;
mod ytdlp;

pub use http::HttpArchiver;
pub use ytdlp::{YtDlpArchiver, parse_info};
