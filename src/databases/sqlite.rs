//! SQLite status log and archive cache

use crate::backends::Database;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::types::Status;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::{FromRow, SqliteConnection};
use std::path::Path;
use std::str::FromStr;

/// Prefix written in front of the status message of a cache hit
pub const CACHED_PREFIX: &str = "[cached] ";

/// One row of the `archives` table
#[derive(Debug, Clone, FromRow)]
pub struct ArchiveRecord {
    /// Working URL of the item (primary key)
    pub url: String,
    /// Status key (`success`, `failure`, `in_progress`, …)
    pub status: String,
    /// Human-readable status written back to the tracking store
    pub status_message: String,
    /// Archiver that produced the content
    pub archived_by: Option<String>,
    /// Serialized [`Metadata`] for finished items
    pub metadata: Option<String>,
    /// Failure reason
    pub error: Option<String>,
    /// Unix timestamp of the first notification
    pub created_at: i64,
    /// Unix timestamp of the latest notification
    pub updated_at: i64,
}

/// Archive database backed by SQLite
///
/// Every notification upserts the row for the item's working URL. With
/// `use_cache`, a stored success is returned from [`Database::fetch`] so that
/// re-submitting an archived URL performs no further work.
pub struct SqliteDatabase {
    pool: SqlitePool,
    use_cache: bool,
}

impl SqliteDatabase {
    /// Open (creating if needed) the database at `path` and run migrations
    pub async fn new(path: &Path, use_cache: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Database(format!("Failed to parse database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool, use_cache };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Row for `url`, if one was ever written
    pub async fn get_record(&self, url: &str) -> Result<Option<ArchiveRecord>> {
        let record = sqlx::query_as::<_, ArchiveRecord>("SELECT * FROM archives WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Database(format!("Failed to acquire connection: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to create schema_version table: {}", e)))?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        Ok(())
    }

    /// Migration v1: archives table
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        sqlx::query("BEGIN").execute(&mut *conn).await?;
        let result = async {
            sqlx::query(
                r#"
                CREATE TABLE archives (
                    url TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    status_message TEXT NOT NULL DEFAULT '',
                    archived_by TEXT,
                    metadata TEXT,
                    error TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
            )
            .execute(&mut *conn)
            .await?;
            sqlx::query("CREATE INDEX idx_archives_status ON archives(status)")
                .execute(&mut *conn)
                .await?;
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *conn)
                .await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| {
                    Error::Database(format!("Failed to commit migration v1: {}", e))
                })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    async fn upsert(
        &self,
        url: &str,
        status: Status,
        status_message: &str,
        item: Option<&Metadata>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let metadata = item.map(serde_json::to_string).transpose()?;
        let archived_by = item.and_then(|i| i.archived_by()).map(str::to_string);

        sqlx::query(
            r#"
            INSERT INTO archives (url, status, status_message, archived_by, metadata, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                status_message = excluded.status_message,
                archived_by = COALESCE(excluded.archived_by, archives.archived_by),
                metadata = COALESCE(excluded.metadata, archives.metadata),
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(url)
        .bind(status_key(status))
        .bind(status_message)
        .bind(archived_by)
        .bind(metadata)
        .bind(error)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Stable key stored in the `status` column
pub fn status_key(status: Status) -> &'static str {
    match status {
        Status::NotStarted => "not_started",
        Status::InProgress => "in_progress",
        Status::Success => "success",
        Status::Failure => "failure",
        Status::NothingArchived => "nothing_archived",
        Status::Aborted => "aborted",
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn name(&self) -> &str {
        "sqlite_db"
    }

    async fn started(&self, item: &Metadata) -> Result<()> {
        self.upsert(
            item.get_url(),
            Status::InProgress,
            Status::InProgress.label(),
            None,
            None,
        )
        .await
    }

    async fn fetch(&self, item: &Metadata) -> Result<Option<Metadata>> {
        if !self.use_cache {
            return Ok(None);
        }
        let stored: Option<Option<String>> = sqlx::query_scalar(
            "SELECT metadata FROM archives WHERE url = ? AND status = ?",
        )
        .bind(item.get_url())
        .bind(status_key(Status::Success))
        .fetch_optional(&self.pool)
        .await?;

        match stored.flatten() {
            Some(json) => {
                tracing::debug!(url = item.get_url(), "Archive cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn done(&self, item: &Metadata, cached: bool) -> Result<()> {
        let mut message = item.status_message();
        if cached {
            message.insert_str(0, CACHED_PREFIX);
        }
        // a cache hit must not overwrite the stored record with itself
        let record = (!cached).then_some(item);
        self.upsert(item.get_url(), item.status(), &message, record, None)
            .await
    }

    async fn failed(&self, item: &Metadata, reason: &str) -> Result<()> {
        let message = format!("{} {}", Status::Failure.label(), reason);
        self.upsert(item.get_url(), Status::Failure, &message, None, Some(reason))
            .await
    }

    async fn aborted(&self, item: &Metadata) -> Result<()> {
        self.upsert(
            item.get_url(),
            Status::Aborted,
            Status::Aborted.label(),
            None,
            None,
        )
        .await
    }
}
