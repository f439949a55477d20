//! Router-level tests: authentication, error mapping and stream responses.
//!
//! Requests are driven through `tower::ServiceExt::oneshot`, no socket
//! is opened.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use hostctl_axum::bootstrap::{AxumContext, CorsConfig, ServerConfig, bootstrap};
use hostctl_axum::create_router;
use hostctl_core::{LogRecord, LogTarget, Settings, Severity, StreamError};
use hostctl_runtime::sessions::LaunchedSource;
use hostctl_runtime::{LogSourceLauncher, SessionConfig, SessionRegistry};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn test_config(dir: &TempDir, auth: bool) -> ServerConfig {
    ServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        data_root: dir.path().to_path_buf(),
        settings: Settings::with_defaults(),
        cors: CorsConfig::AllowAll,
        auth_token: auth.then(|| TOKEN.to_string()),
    }
}

fn app(dir: &TempDir, auth: bool) -> Router {
    let config = test_config(dir, auth);
    let ctx = bootstrap(&config).expect("Failed to bootstrap");
    create_router(ctx, &config.cors)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, true).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_token() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, true).oneshot(get("/api/sessions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let wrong = Request::builder()
        .uri("/api/sessions")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = app(&dir, true).oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_and_cookie_are_accepted() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, true).oneshot(authed("/api/sessions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!([]));

    let with_cookie = Request::builder()
        .uri("/api/sessions")
        .header(header::COOKIE, format!("auth_token={TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app(&dir, true).oneshot(with_cookie).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_job_is_404() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, false)
        .oneshot(get("/api/jobs/job-unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["status"], 404);
    assert_eq!(body["type"], "NOT_FOUND");

    let response = app(&dir, false)
        .oneshot(get("/api/jobs/job-unknown/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_list_starts_empty() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, false).oneshot(get("/api/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn invalid_job_requests_are_400() {
    let dir = TempDir::new().unwrap();
    let relative = serde_json::json!({ "kind": "unzip", "archive": "site.zip" });
    let response = app(&dir, false)
        .oneshot(post_json("/api/jobs", &relative))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let split = serde_json::json!({
        "kind": "zip",
        "paths": ["/srv/a", "/opt/b"],
        "destination": "/tmp/out.zip"
    });
    let response = app(&dir, false)
        .oneshot(post_json("/api/jobs", &split))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn flag_like_service_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir, false)
        .oneshot(get("/api/logs/--since=today/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&dir, false)
        .oneshot(get("/api/pm2/logs/--lines/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn log_stream_is_event_stream() {
    let dir = TempDir::new().unwrap();
    // Either the journal follower starts or its spawn failure is reported
    // inside the stream; both are a 200 event stream.
    let response = app(&dir, false)
        .oneshot(get("/api/logs/hostctl-test-unit/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
}

/// A log source whose binary is never there.
struct UnavailableSource;

#[async_trait]
impl LogSourceLauncher for UnavailableSource {
    async fn launch(&self, _target: &LogTarget) -> Result<LaunchedSource, StreamError> {
        Err(StreamError::spawn("journalctl", "No such file or directory"))
    }
}

#[tokio::test]
async fn unavailable_source_reports_once_and_stays_open() {
    let dir = TempDir::new().unwrap();
    let ctx = bootstrap(&test_config(&dir, false)).unwrap();
    let ctx = AxumContext {
        sessions: SessionRegistry::new(SessionConfig::default(), Arc::new(UnavailableSource)),
        ..ctx
    };
    let app = create_router(ctx, &CorsConfig::AllowAll);

    let response = app.oneshot(get("/api/logs/nginx/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("no event before timeout")
        .expect("stream ended")
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(!text.contains("event:"));
    let json = text
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .unwrap()
        .trim();
    let record: LogRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.severity, Severity::ERROR);
    assert_eq!(record.source, "nginx");
    assert!(record.message.contains("journalctl"));
    assert!(record.message.contains("No such file or directory"));

    // No `end` and no further records: the stream just stays open
    assert!(
        tokio::time::timeout(Duration::from_millis(300), body.frame())
            .await
            .is_err()
    );
}
