//! Database backend that only writes to the tracing log

use crate::backends::Database;
use crate::error::Result;
use crate::metadata::Metadata;
use async_trait::async_trait;

/// Logs every lifecycle notification; never caches
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDatabase;

#[async_trait]
impl Database for LogDatabase {
    fn name(&self) -> &str {
        "log_db"
    }

    async fn started(&self, item: &Metadata) -> Result<()> {
        tracing::info!(url = item.get_url(), "Archive started");
        Ok(())
    }

    async fn done(&self, item: &Metadata, cached: bool) -> Result<()> {
        tracing::info!(
            url = item.get_url(),
            status = %item.status_message(),
            media = item.media().len(),
            cached,
            "Archive done"
        );
        Ok(())
    }

    async fn failed(&self, item: &Metadata, reason: &str) -> Result<()> {
        tracing::error!(url = item.get_url(), reason, "Archive failed");
        Ok(())
    }

    async fn aborted(&self, item: &Metadata) -> Result<()> {
        tracing::warn!(url = item.get_url(), "Archive aborted");
        Ok(())
    }
}
