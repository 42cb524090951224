//! Enricher backends
//!
//! Enrichers run after archiving, whether or not an archiver succeeded, and
//! annotate media in place. File work happens asynchronously on a snapshot of
//! positions; results are written back in a second, synchronous walk.

mod duration;
mod hash;
mod thumbnail;

pub use duration::DurationEnricher;
pub use hash::{HashEnricher, hash_file};
pub use thumbnail::ThumbnailEnricher;

use crate::media::Media;
use crate::metadata::Metadata;
use std::path::PathBuf;

/// Positions (in [`Metadata::get_all_media`] order) and files of matching media
pub(crate) fn media_positions(
    item: &Metadata,
    mut pred: impl FnMut(&Media) -> bool,
) -> Vec<(usize, PathBuf)> {
    item.get_all_media()
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.filename().as_os_str().is_empty() && pred(m))
        .map(|(pos, m)| (pos, m.filename().to_path_buf()))
        .collect()
}

/// Visit every media with its position
pub(crate) fn apply_by_position(item: &mut Metadata, mut f: impl FnMut(&mut Media, usize)) {
    let mut pos = 0usize;
    item.for_each_media_mut(&mut |m| {
        f(m, pos);
        pos += 1;
    });
}
