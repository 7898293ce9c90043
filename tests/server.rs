use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use handbook_pdf::server::router;
use handbook_pdf::{Config, MemoryDocument, MemoryLauncher, Pipeline};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const ENCODED_TARGET: &str = "http%3A%2F%2Fhandbook.test%2Fhandbook%3Fprint%3Dtrue";

fn app(dir: &Path, launcher: MemoryLauncher) -> Router {
    let mut cfg = Config::default();
    cfg.output_dir = dir.join("output");
    cfg.sections.settle_delay = Duration::from_millis(1);
    cfg.readiness.poll_interval = Duration::from_millis(5);
    cfg.readiness.idle_interval = Duration::from_millis(10);
    let pipeline = Pipeline::with_launcher(&cfg, Arc::new(launcher)).expect("pipeline");
    router(Arc::new(pipeline))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, body, content_type)
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn missing_target_is_a_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = app(dir.path(), MemoryLauncher::default());

    let (status, body, _) = get(&app, "/print/handbook").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Invalid target URL.");
}

#[tokio::test]
async fn target_without_print_marker_is_rejected_before_launching() {
    let dir = TempDir::new().unwrap();
    let launcher = MemoryLauncher::default();
    let app = app(dir.path(), launcher.clone());

    let (status, body, _) = get(
        &app,
        "/print/handbook?targetUrl=http%3A%2F%2Fhandbook.test%2Fhandbook",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Invalid target URL.");
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn generated_file_is_served_under_output() {
    let dir = TempDir::new().unwrap();
    let app = app(
        dir.path(),
        MemoryLauncher::new(MemoryDocument::with_sections(["Welcome", "Benefits"])),
    );

    let (status, body, _) = get(&app, &format!("/print/handbook?targetUrl={ENCODED_TARGET}")).await;
    assert_eq!(status, StatusCode::OK);
    let url = json(&body)["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/output/handbook-"), "{url}");
    assert!(url.ends_with(".pdf"), "{url}");

    let (status, pdf, content_type) = get(&app, &url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert!(pdf.starts_with(b"%PDF-"));
    assert_eq!(handbook_pdf::merge::page_count(&pdf).unwrap(), 2);
}

#[tokio::test]
async fn pipeline_failure_is_a_generic_server_error() {
    let dir = TempDir::new().unwrap();
    let app = app(
        dir.path(),
        MemoryLauncher::new(MemoryDocument::with_sections(Vec::<String>::new())),
    );

    let (status, body, _) = get(&app, &format!("/print/handbook?targetUrl={ENCODED_TARGET}")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "PDF generation failed.");
}

#[tokio::test]
async fn only_issued_file_names_are_served() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("output");
    std::fs::create_dir_all(output.join("diagnostics")).unwrap();
    std::fs::write(output.join("notes.pdf"), b"%PDF-1.5").unwrap();
    let app = app(dir.path(), MemoryLauncher::default());

    let (status, _, _) = get(&app, "/output/notes.pdf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&app, "/output/diagnostics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing = format!("/output/handbook-{}.pdf", uuid::Uuid::new_v4());
    let (status, _, _) = get(&app, &missing).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
