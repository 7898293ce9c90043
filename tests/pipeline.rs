use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use handbook_pdf::{
    Config, ErrorKind, GenerationRequest, MemoryDocument, MemoryLauncher, OutputStore, Pipeline,
    PipelineState,
};
use tempfile::TempDir;

const URL: &str = "http://handbook.test/handbook?print=true";

fn config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.output_dir = dir.join("output");
    cfg.sections.settle_delay = Duration::from_millis(1);
    cfg.readiness.poll_interval = Duration::from_millis(5);
    cfg.readiness.idle_interval = Duration::from_millis(10);
    cfg.readiness.attempt_timeout = Duration::from_millis(500);
    cfg.timeouts.launch = Duration::from_secs(2);
    cfg.timeouts.navigation = Duration::from_secs(2);
    cfg.timeouts.capture = Duration::from_secs(2);
    cfg
}

fn pipeline(cfg: &Config, launcher: &MemoryLauncher) -> Pipeline {
    Pipeline::with_launcher(cfg, Arc::new(launcher.clone())).expect("pipeline")
}

fn pdfs_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "pdf" || ext == "part"))
        .collect()
}

fn page_texts(path: &Path) -> Vec<String> {
    let doc = lopdf::Document::load(path).expect("load merged pdf");
    doc.get_pages()
        .values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
        .collect()
}

fn single_failure_record(cfg: &Config) -> serde_json::Value {
    let runs: Vec<_> = std::fs::read_dir(cfg.diagnostics_dir())
        .expect("diagnostics dir")
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1, "one bundle per failed request");
    let raw = std::fs::read_to_string(runs[0].join("failure.json")).expect("failure.json");
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn each_section_becomes_one_page_in_document_order() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections([
        "Welcome", "Benefits", "Policies",
    ]));
    let pipeline = pipeline(&cfg, &launcher);

    let report = pipeline
        .run(GenerationRequest::parse(URL).unwrap())
        .await
        .expect("generation succeeds");

    assert_eq!(report.pages, 3);
    assert!(OutputStore::is_artifact_name(&report.artifact.filename));
    assert_eq!(report.artifact.filepath, cfg.output_dir.join(&report.artifact.filename));

    let texts = page_texts(&report.artifact.filepath);
    assert_eq!(texts.len(), 3);
    for (text, label) in texts.iter().zip(["Welcome", "Benefits", "Policies"]) {
        assert!(text.contains(label), "page should show {label}: {text}");
    }
    assert!(!texts[0].contains("Benefits"));

    assert_eq!(report.states.first(), Some(&PipelineState::Idle));
    assert_eq!(report.states.last(), Some(&PipelineState::Done));
    assert!(report
        .states
        .contains(&PipelineState::Capturing { index: 2, total: 3 }));

    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.closes(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn merged_pages_use_the_configured_page_size() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]));

    let artifact = pipeline(&cfg, &launcher).generate(URL).await.unwrap();

    let doc = lopdf::Document::load(&artifact.filepath).unwrap();
    for page_id in doc.get_pages().values() {
        let page = doc.get_dictionary(*page_id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let width = media_box[2].as_float().unwrap();
        let height = media_box[3].as_float().unwrap();
        assert!((width - 595.5).abs() < 0.5, "width {width}");
        assert!((height - 842.25).abs() < 0.5, "height {height}");
    }
}

#[tokio::test]
async fn zero_sections_fails_without_writing_a_pdf() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(Vec::<String>::new()));
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSectionsFound);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
    assert_eq!(single_failure_record(&cfg)["state"]["state"], "navigated");
    assert_eq!(launcher.closes(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn repeated_runs_get_distinct_files() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["Only"]));
    let pipeline = pipeline(&cfg, &launcher);

    let first = pipeline.generate(URL).await.unwrap();
    let second = pipeline.generate(URL).await.unwrap();

    assert_ne!(first.filename, second.filename);
    assert!(first.filepath.is_file());
    assert!(second.filepath.is_file());
    assert_eq!(pdfs_in(&cfg.output_dir).len(), 2);
}

#[tokio::test]
async fn navigation_hang_times_out_with_a_failure_bundle() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.timeouts.navigation = Duration::from_millis(200);
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A"]).hang_navigation());
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(pdfs_in(&cfg.output_dir).is_empty());

    let record = single_failure_record(&cfg);
    assert_eq!(record["kind"], "TimeoutError");
    assert_eq!(record["state"]["state"], "session-acquired");
    assert!(record["remediation"].as_str().unwrap().contains("--nav-timeout"));
    assert_eq!(pipeline.sessions().live_sessions(), 0);
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn cancelled_run_still_frees_its_session() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.timeouts.navigation = Duration::from_secs(60);
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A"]).hang_navigation());
    let pipeline = pipeline(&cfg, &launcher);

    let outcome = tokio::time::timeout(Duration::from_millis(100), pipeline.generate(URL)).await;

    assert!(outcome.is_err(), "run should still be waiting on navigation");
    assert_eq!(launcher.launches(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
}

#[tokio::test]
async fn assets_that_never_finish_time_out() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.timeouts.navigation = Duration::from_millis(300);
    cfg.readiness.attempt_timeout = Duration::from_millis(50);
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A"]).assets_never_ready());

    let err = pipeline(&cfg, &launcher).generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn slow_assets_are_waited_for() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(
        MemoryDocument::with_sections(["A", "B"])
            .assets_ready_after(3)
            .in_flight_for(2),
    );

    let report = pipeline(&cfg, &launcher)
        .run(GenerationRequest::parse(URL).unwrap())
        .await
        .unwrap();
    assert_eq!(report.pages, 2);
}

#[tokio::test]
async fn error_status_is_a_page_load_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A"]).status(404));
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PageLoad);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn launch_failure_is_a_launch_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::failing("Could not auto detect a chrome executable");
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Launch);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
    assert_eq!(single_failure_record(&cfg)["state"]["state"], "idle");
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn launch_that_never_returns_is_a_launch_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.timeouts.launch = Duration::from_millis(100);
    let launcher = MemoryLauncher::hanging();

    let err = pipeline(&cfg, &launcher).generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Launch);
}

#[tokio::test]
async fn capture_failure_releases_the_session() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(
        MemoryDocument::with_sections(["A", "B", "C"]).fail_capture_at(1),
    );
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Capture);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
    let record = single_failure_record(&cfg);
    assert_eq!(record["state"]["state"], "capturing");
    assert_eq!(record["state"]["index"], 1);
    assert_eq!(launcher.closes(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn capture_hang_is_a_timeout() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.timeouts.capture = Duration::from_millis(150);
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]).hang_capture_at(0));

    let err = pipeline(&cfg, &launcher).generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
    assert_eq!(launcher.closes(), 1);
}

#[tokio::test]
async fn isolation_that_does_not_take_effect_is_a_capture_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]).broken_isolation());

    let err = pipeline(&cfg, &launcher).generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Capture);
}

#[tokio::test]
async fn relative_url_is_rejected_before_launching() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::default();

    let err = pipeline(&cfg, &launcher)
        .generate("/handbook?print=true")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn concurrent_requests_respect_the_session_limit() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.browser.max_concurrent_sessions = 2;
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]))
        .with_launch_delay(Duration::from_millis(30));
    let pipeline = pipeline(&cfg, &launcher);

    let runs = (0..5).map(|_| pipeline.generate(URL));
    let results = futures::future::join_all(runs).await;

    let mut names: Vec<_> = results
        .into_iter()
        .map(|result| result.expect("every run succeeds").filename)
        .collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 5);
    assert_eq!(launcher.launches(), 5);
    assert_eq!(launcher.closes(), 5);
    assert!(launcher.peak_concurrency() <= 2, "peak {}", launcher.peak_concurrency());
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn successful_runs_leave_no_diagnostics_behind() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]));
    let pipeline = pipeline(&cfg, &launcher);

    for _ in 0..3 {
        let report = pipeline
            .run(GenerationRequest::parse(URL).unwrap())
            .await
            .unwrap();
        assert!(report.diagnostics.is_none());
    }

    assert!(!cfg.diagnostics_dir().exists());
    assert_eq!(pdfs_in(&cfg.output_dir).len(), 3);
}

#[tokio::test]
async fn section_spilling_onto_two_pages_is_a_merge_error() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    let launcher =
        MemoryLauncher::new(MemoryDocument::with_sections(["A", "B", "C"]).overflow_at(1));
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Merge);
    assert!(pdfs_in(&cfg.output_dir).is_empty());
    assert_eq!(single_failure_record(&cfg)["kind"], "MergeError");
    assert_eq!(launcher.closes(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn unwritable_output_is_a_persist_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    let blocker = dir.path().join("output-is-a-file");
    std::fs::write(&blocker, b"not a directory").unwrap();
    cfg.output_dir = blocker.clone();
    cfg.diagnostics.directory = Some(dir.path().join("diagnostics"));
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A"]));
    let pipeline = pipeline(&cfg, &launcher);

    let err = pipeline.generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persist);
    assert!(blocker.is_file());
    assert!(pdfs_in(dir.path()).is_empty());
    let record = single_failure_record(&cfg);
    assert_eq!(record["kind"], "PersistError");
    assert_eq!(record["state"]["state"], "merged");
    assert_eq!(launcher.closes(), 1);
    assert_eq!(pipeline.sessions().live_sessions(), 0);
}

#[tokio::test]
async fn diagnostics_can_be_switched_off() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.diagnostics.enabled = false;
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(Vec::<String>::new()));

    let err = pipeline(&cfg, &launcher).generate(URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoSectionsFound);
    assert!(!cfg.diagnostics_dir().exists());
}

#[tokio::test]
async fn per_section_checkpoints_are_recorded_on_request() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path());
    cfg.diagnostics.per_section = true;
    let launcher = MemoryLauncher::new(MemoryDocument::with_sections(["A", "B"]));

    let report = pipeline(&cfg, &launcher)
        .run(GenerationRequest::parse(URL).unwrap())
        .await
        .unwrap();

    let bundle = report.diagnostics.expect("bundle on success");
    let names: Vec<String> = bundle
        .files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&"loaded.png".to_string()), "{names:?}");
    assert!(names.contains(&"section-1.html".to_string()), "{names:?}");
    assert!(names.contains(&"section-2-console.json".to_string()), "{names:?}");
}
