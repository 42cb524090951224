//! Database backends
//!
//! - [`SqliteDatabase`] keeps a status row per URL and serves finished
//!   records back as cache hits
//! - [`LogDatabase`] reports lifecycle events to the tracing log

mod log;
mod sqlite;

pub use log::LogDatabase;
pub use sqlite::{ArchiveRecord, CACHED_PREFIX, SqliteDatabase, status_key};
