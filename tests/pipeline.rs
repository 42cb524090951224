//! End-to-end archiving runs against local storage and a SQLite database

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{FileArchiver, Workspace, files_under};
use link_archiver::databases::CACHED_PREFIX;
use link_archiver::feeders::ListFeeder;
use link_archiver::metadata::ORIGINAL_URL_KEY;
use link_archiver::{Metadata, Status};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn feed_archives_stores_and_records_each_row() {
    let ws = Workspace::new();
    let archiver = Arc::new(FileArchiver::default());
    let db = ws.database().await;
    let orchestrator = ws.orchestrator(archiver.clone(), db.clone()).await;

    let mut feeder = ListFeeder::from_urls([
        "https://example.com/video?utm_source=feed",
        "https://example.com/article",
    ]);
    let summary = orchestrator
        .feed(&mut feeder, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);
    assert!(!summary.aborted);

    let video = db.get_record("https://example.com/video").await.unwrap().unwrap();
    assert_eq!(video.status, "success");
    assert_eq!(video.status_message, "file_archiver: success");
    assert_eq!(video.archived_by.as_deref(), Some("file_archiver"));

    let stored: Metadata = serde_json::from_str(video.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(
        stored.get_str(ORIGINAL_URL_KEY),
        Some("https://example.com/video?utm_source=feed")
    );
    assert!(stored.final_media().is_some());
    assert!(stored.media().iter().all(|m| !m.urls.is_empty()));

    let article = db.get_record("https://example.com/article").await.unwrap().unwrap();
    assert_eq!(article.status, "nothing_archived");

    let files = files_under(&ws.archived().join("proj").join("media"));
    assert_eq!(files.len(), 2, "{files:?}");
    assert!(files.iter().any(|f| f.extension().is_some_and(|e| e == "mp4")));
    assert!(files.iter().any(|f| f.extension().is_some_and(|e| e == "html")));
}

#[tokio::test]
async fn resubmitted_url_is_served_from_the_database() {
    let ws = Workspace::new();
    let archiver = Arc::new(FileArchiver::default());
    let db = ws.database().await;

    let first = ws
        .orchestrator(archiver.clone(), db.clone())
        .await
        .process(Metadata::new("https://example.com/video"))
        .await
        .unwrap();
    assert!(first.is_success());

    let again = ws
        .orchestrator(archiver.clone(), db.clone())
        .await
        .process(Metadata::new("https://example.com/video?ref=share"))
        .await
        .unwrap();

    assert_eq!(archiver.downloads(), 1, "cache hit must not download");
    assert!(again.is_success());
    assert_eq!(again.media().len(), first.media().len());

    let record = db.get_record("https://example.com/video").await.unwrap().unwrap();
    assert!(record.status_message.starts_with(CACHED_PREFIX), "{}", record.status_message);
}

#[tokio::test]
async fn internal_addresses_are_refused_before_any_backend_runs() {
    let ws = Workspace::new();
    let archiver = Arc::new(FileArchiver::default());
    let db = ws.database().await;
    let orchestrator = ws.orchestrator(archiver.clone(), db.clone()).await;

    let result = orchestrator
        .process(Metadata::new("http://169.254.169.254/latest/video"))
        .await;

    assert!(result.is_none());
    assert_eq!(archiver.downloads(), 0);
    let record = db
        .get_record("http://169.254.169.254/latest/video")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, link_archiver::databases::status_key(Status::Failure));
    assert!(record.error.unwrap().contains("169.254.169.254"));
    assert!(files_under(&ws.archived()).is_empty());
}
