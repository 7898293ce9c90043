//! Best-effort forensic artifacts for one generation request.
//!
//! Nothing in here returns an error: a diagnostic that cannot be grabbed or
//! written is logged at `warn` and skipped.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::browser::{ConsoleEntry, NetworkEntry, RenderSession};
use crate::config::DiagnosticSettings;
use crate::pipeline::PipelineState;
use crate::HandbookError;

/// Per-request diagnostic state, passed explicitly through the pipeline.
#[derive(Debug)]
pub struct DiagnosticContext {
    request_id: String,
    directory: PathBuf,
    enabled: bool,
    per_section: bool,
    console: Vec<ConsoleEntry>,
    network: Vec<NetworkEntry>,
    /// Artifacts grabbed on the way, written only if the request fails.
    held: Vec<(String, Vec<u8>)>,
    files: Vec<PathBuf>,
}

impl DiagnosticContext {
    pub fn new(request_id: impl Into<String>, directory: PathBuf, settings: &DiagnosticSettings) -> Self {
        Self {
            request_id: request_id.into(),
            directory,
            enabled: settings.enabled,
            per_section: settings.per_section,
            console: Vec::new(),
            network: Vec::new(),
            held: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn disabled(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            directory: PathBuf::new(),
            enabled: false,
            per_section: false,
            console: Vec::new(),
            network: Vec::new(),
            held: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn per_section(&self) -> bool {
        self.enabled && self.per_section
    }

    pub fn bundle(&self) -> Option<DiagnosticBundle> {
        (!self.files.is_empty()).then(|| DiagnosticBundle {
            directory: self.directory.clone(),
            files: self.files.clone(),
        })
    }

    fn absorb_logs(&mut self, session: &mut RenderSession) {
        if let Ok(driver) = session.driver() {
            self.console.extend(driver.take_console());
            self.network.extend(driver.take_network());
        }
    }
}

/// Files written for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticBundle {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureRecord<'a> {
    request_id: &'a str,
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    remediation: Option<String>,
    state: &'a PipelineState,
    recorded_at_ms: u128,
}

#[derive(Debug, Clone)]
pub struct DiagnosticRecorder {
    grab_timeout: Duration,
}

impl Default for DiagnosticRecorder {
    fn default() -> Self {
        Self::new(DiagnosticSettings::default().grab_timeout)
    }
}

impl DiagnosticRecorder {
    pub fn new(grab_timeout: Duration) -> Self {
        Self { grab_timeout }
    }

    /// Screenshot, HTML, console and network logs under `<checkpoint>*`.
    pub async fn checkpoint(
        &self,
        ctx: &mut DiagnosticContext,
        session: &mut RenderSession,
        name: &str,
    ) {
        if !ctx.enabled {
            return;
        }
        let artifacts = self.grab(ctx, session, name).await;
        if !ensure_dir(&ctx.directory).await {
            return;
        }
        for (file_name, bytes) in artifacts {
            write_artifact(ctx, file_name, bytes).await;
        }
        debug!(request_id = %ctx.request_id, checkpoint = name, "diagnostics recorded");
    }

    /// A checkpoint kept in memory until `record_failure`; a successful run leaves nothing behind.
    /// Written at once when per-section artifacts were asked for.
    pub async fn hold(&self, ctx: &mut DiagnosticContext, session: &mut RenderSession, name: &str) {
        if !ctx.enabled {
            return;
        }
        if ctx.per_section {
            self.checkpoint(ctx, session, name).await;
            return;
        }
        let artifacts = self.grab(ctx, session, name).await;
        ctx.held.extend(artifacts);
        debug!(request_id = %ctx.request_id, checkpoint = name, "diagnostics held");
    }

    async fn grab(
        &self,
        ctx: &mut DiagnosticContext,
        session: &mut RenderSession,
        name: &str,
    ) -> Vec<(String, Vec<u8>)> {
        ctx.absorb_logs(session);
        let mut artifacts = Vec::with_capacity(4);
        if let Some(png) = self.grab_screenshot(session, name).await {
            artifacts.push((format!("{name}.png"), png));
        }
        if let Some(html) = self.grab_html(session, name).await {
            artifacts.push((format!("{name}.html"), html.into_bytes()));
        }
        artifacts.push((format!("{name}-console.json"), to_json(&ctx.console)));
        artifacts.push((format!("{name}-network.json"), to_json(&ctx.network)));
        artifacts
    }

    /// `failure.json` first, then a `failure` checkpoint if the page is still there.
    pub async fn record_failure(
        &self,
        ctx: &mut DiagnosticContext,
        session: Option<&mut RenderSession>,
        error: &HandbookError,
        state: &PipelineState,
    ) {
        if !ctx.enabled {
            return;
        }
        if !ensure_dir(&ctx.directory).await {
            return;
        }

        let payload = error.to_payload();
        let record = FailureRecord {
            request_id: &ctx.request_id,
            kind: payload.kind.as_str(),
            message: payload.message,
            remediation: payload.remediation,
            state,
            recorded_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis())
                .unwrap_or_default(),
        };
        let json = to_json(&record);
        write_artifact(ctx, "failure.json".to_string(), json).await;
        for (file_name, bytes) in std::mem::take(&mut ctx.held) {
            write_artifact(ctx, file_name, bytes).await;
        }

        if let Some(session) = session {
            if !session.is_released() {
                self.checkpoint(ctx, session, "failure").await;
            }
        }
    }

    async fn grab_screenshot(&self, session: &mut RenderSession, name: &str) -> Option<Vec<u8>> {
        let driver = session.driver().ok()?;
        match timeout(self.grab_timeout, driver.screenshot()).await {
            Ok(Ok(png)) => Some(png),
            Ok(Err(err)) => {
                warn!(checkpoint = name, error = %err, "screenshot failed");
                None
            }
            Err(_) => {
                warn!(checkpoint = name, timeout = ?self.grab_timeout, "screenshot timed out");
                None
            }
        }
    }

    async fn grab_html(&self, session: &mut RenderSession, name: &str) -> Option<String> {
        let driver = session.driver().ok()?;
        match timeout(self.grab_timeout, driver.html()).await {
            Ok(Ok(html)) => Some(html),
            Ok(Err(err)) => {
                warn!(checkpoint = name, error = %err, "HTML snapshot failed");
                None
            }
            Err(_) => {
                warn!(checkpoint = name, timeout = ?self.grab_timeout, "HTML snapshot timed out");
                None
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec_pretty(value).unwrap_or_else(|err| {
        warn!(error = %err, "diagnostic serialization failed");
        b"null".to_vec()
    })
}

async fn ensure_dir(directory: &Path) -> bool {
    match tokio::fs::create_dir_all(directory).await {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %directory.display(), error = %err, "cannot create diagnostics directory");
            false
        }
    }
}

async fn write_artifact(ctx: &mut DiagnosticContext, file_name: String, bytes: Vec<u8>) {
    let path = ctx.directory.join(file_name);
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => ctx.files.push(path),
        Err(err) => warn!(path = %path.display(), error = %err, "diagnostic write failed"),
    }
}
