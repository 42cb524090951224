// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::config::JobsConfig;
use crate::error::Result as CrateResult;
use crate::jobs::{JobOperation, JobRequest};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tower::ServiceExt;

/// Records the job ids it ran for
#[derive(Default)]
struct SeenJobs(Mutex<Vec<String>>);

#[async_trait]
impl JobOperation for SeenJobs {
    fn name(&self) -> &str {
        "record"
    }

    async fn run(&self, request: &JobRequest, _cancel: &CancellationToken) -> CrateResult<()> {
        self.0.lock().unwrap().push(request.job_id.to_string());
        Ok(())
    }
}

fn controller() -> (Arc<JobController>, Arc<SeenJobs>) {
    let seen = Arc::new(SeenJobs::default());
    let controller = JobController::start(
        vec![seen.clone() as Arc<dyn JobOperation>],
        &JobsConfig::default(),
        CancellationToken::new(),
    );
    (Arc::new(controller), seen)
}

async fn post_jobs(app: Router, body: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn wait_for_jobs(seen: &SeenJobs, n: usize) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let jobs = seen.0.lock().unwrap().clone();
            if jobs.len() >= n {
                return jobs;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never ran")
}

#[tokio::test]
async fn valid_job_is_queued_and_runs() {
    let (controller, seen) = controller();
    let app = create_router(controller);

    let (status, body) = post_jobs(app, r#"{"spreadsheetId": "sheet-1", "projectName": "proj"}"#).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(wait_for_jobs(&seen, 1).await, ["sheet-1"]);
}

#[tokio::test]
async fn malformed_job_is_acknowledged_and_dropped() {
    let (controller, seen) = controller();
    let app = create_router(controller);

    let (status, body) = post_jobs(app.clone(), "{definitely not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "dropped");

    let (status, _) = post_jobs(app, r#"{"projectName": "no id"}"#).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn shutting_down_controller_returns_503() {
    let (controller, _seen) = controller();
    controller.cancel_token().cancel();
    let app = create_router(controller);

    let (status, body) = post_jobs(app, r#"{"jobId": "late"}"#).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "shutting_down");
}

#[tokio::test]
async fn health_reports_ok() {
    let (controller, _seen) = controller();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = create_router(controller).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn server_stops_when_cancelled() {
    let (controller, _seen) = controller();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(serve_with_listener(listener, controller, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}
