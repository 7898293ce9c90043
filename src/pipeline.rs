//! End-to-end conversion of one handbook URL into one merged PDF.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::browser::{
    navigate, BrowserLauncher, BrowserOptions, ReadinessCheck, ReadinessOptions, RenderSession,
    SessionManager,
};
use crate::capture::CaptureEngine;
use crate::config::{Config, DiagnosticSettings};
use crate::diagnostics::{DiagnosticBundle, DiagnosticContext, DiagnosticRecorder};
use crate::error::ErrorKind;
use crate::merge::{merge, MergedDocument};
use crate::sections::{locate, SectionSelectors};
use crate::storage::{OutputArtifact, OutputStore};
use crate::visibility::VisibilityController;
use crate::{HandbookError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub source_url: Url,
    pub request_id: RequestId,
}

impl GenerationRequest {
    pub fn new(source_url: Url) -> Self {
        Self {
            source_url,
            request_id: RequestId::new(),
        }
    }

    /// Parse an absolute URL; relative or malformed input is `InvalidUrl`.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(raw.trim())?))
    }
}

/// Where a generation request currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum PipelineState {
    Idle,
    SessionAcquired,
    Navigated,
    SectionsLocated { sections: usize },
    Capturing { index: usize, total: usize },
    Merged { pages: usize },
    Persisted,
    Done,
    Failed { kind: ErrorKind },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed { .. }) => !from.is_terminal(),
            (Idle, SessionAcquired) => true,
            (SessionAcquired, Navigated) => true,
            (Navigated, SectionsLocated { sections }) => *sections > 0,
            (SectionsLocated { sections }, Capturing { index: 0, total }) => sections == total,
            (Capturing { index, total }, Capturing { index: next, total: next_total }) => {
                total == next_total && *next == index + 1 && *next < *total
            }
            (Capturing { index, total }, Merged { pages }) => index + 1 == *total && pages == total,
            (Merged { .. }, Persisted) => true,
            (Persisted, Done) => true,
            _ => false,
        }
    }
}

/// Validated state history for one request.
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    pub fn current(&self) -> &PipelineState {
        &self.current
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.current.can_transition_to(&next) {
            return Err(HandbookError::Internal(format!(
                "illegal pipeline transition {:?} -> {:?}",
                self.current, next
            )));
        }
        debug!(from = ?self.current, to = ?next, "pipeline transition");
        self.current = next.clone();
        self.history.push(next);
        Ok(())
    }

    /// Move to `Failed`; a no-op once terminal.
    pub fn fail(&mut self, kind: ErrorKind) {
        let _ = self.advance(PipelineState::Failed { kind });
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub request_id: RequestId,
    pub artifact: OutputArtifact,
    pub pages: usize,
    pub states: Vec<PipelineState>,
    pub elapsed: Duration,
    pub diagnostics: Option<DiagnosticBundle>,
}

/// The configured conversion pipeline. Cheap to share behind an `Arc`.
pub struct Pipeline {
    sessions: SessionManager,
    readiness: Arc<dyn ReadinessCheck>,
    readiness_options: ReadinessOptions,
    selectors: SectionSelectors,
    visibility: VisibilityController,
    capture: CaptureEngine,
    recorder: DiagnosticRecorder,
    diagnostic_settings: DiagnosticSettings,
    diagnostics_root: PathBuf,
    store: OutputStore,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("sessions", &self.sessions)
            .field("readiness", &self.readiness.name())
            .field("selectors", &self.selectors)
            .field("output_dir", &self.store.root())
            .finish()
    }
}

impl Pipeline {
    /// Pipeline backed by local Chrome/Chromium.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_launcher(config, Arc::new(crate::browser::ChromeLauncher))
    }

    pub fn with_launcher(config: &Config, launcher: Arc<dyn BrowserLauncher>) -> Result<Self> {
        config.validate().map_err(HandbookError::Config)?;
        Ok(Self {
            sessions: SessionManager::new(BrowserOptions::from(config), launcher),
            readiness: config.readiness.strategy.check(),
            readiness_options: ReadinessOptions::from(config),
            selectors: SectionSelectors::from(config.sections.clone()),
            visibility: VisibilityController::new(config.sections.settle_delay),
            capture: CaptureEngine::new(config.browser.page_size, config.timeouts.capture),
            recorder: DiagnosticRecorder::new(config.diagnostics.grab_timeout),
            diagnostic_settings: config.diagnostics.clone(),
            diagnostics_root: config.diagnostics_dir(),
            store: OutputStore::new(config.output_dir.clone()),
        })
    }

    /// Swap the readiness check.
    pub fn with_readiness(mut self, check: Arc<dyn ReadinessCheck>) -> Self {
        self.readiness = check;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// `generate(sourceUrl) -> { filename, filepath }`.
    pub async fn generate(&self, source_url: &str) -> Result<OutputArtifact> {
        let request = GenerationRequest::parse(source_url)?;
        Ok(self.run(request).await?.artifact)
    }

    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationReport> {
        let span = info_span!(
            "generate",
            request_id = %request.request_id,
            url = %request.source_url
        );
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: GenerationRequest) -> Result<GenerationReport> {
        let started = Instant::now();
        let mut tracker = StateTracker::new();
        let request_key = request.request_id.to_string();
        let mut diagnostics = DiagnosticContext::new(
            request_key.clone(),
            self.diagnostics_root.join(&request_key),
            &self.diagnostic_settings,
        );

        let mut session = match self.sessions.acquire().await {
            Ok(session) => session,
            Err(err) => return Err(self.fail(&mut tracker, &mut diagnostics, None, err).await),
        };

        let document = match self
            .render(&mut session, &request, &mut tracker, &mut diagnostics)
            .await
        {
            Ok(document) => document,
            Err(err) => {
                let err = self
                    .fail(&mut tracker, &mut diagnostics, Some(&mut session), err)
                    .await;
                session.release().await;
                return Err(err);
            }
        };
        session.release().await;

        let artifact = match self.persist(&document, &mut tracker).await {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.fail(&mut tracker, &mut diagnostics, None, err).await),
        };

        info!(
            filename = %artifact.filename,
            pages = document.page_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "handbook generated"
        );
        Ok(GenerationReport {
            request_id: request.request_id,
            artifact,
            pages: document.page_count,
            states: tracker.history().to_vec(),
            elapsed: started.elapsed(),
            diagnostics: diagnostics.bundle(),
        })
    }

    async fn render(
        &self,
        session: &mut RenderSession,
        request: &GenerationRequest,
        tracker: &mut StateTracker,
        diagnostics: &mut DiagnosticContext,
    ) -> Result<MergedDocument> {
        tracker.advance(PipelineState::SessionAcquired)?;

        navigate(
            session.driver()?,
            &request.source_url,
            self.readiness.as_ref(),
            &self.readiness_options,
        )
        .await?;
        tracker.advance(PipelineState::Navigated)?;
        self.recorder.hold(diagnostics, session, "loaded").await;

        let sections = locate(session, &self.selectors).await?;
        let total = sections.len();
        tracker.advance(PipelineState::SectionsLocated { sections: total })?;

        let mut fragments = Vec::with_capacity(total);
        for index in 0..total {
            tracker.advance(PipelineState::Capturing { index, total })?;
            let isolated = self.visibility.isolate(session, &sections, index).await?;
            let fragment = self.capture.capture(session, isolated).await?;
            if diagnostics.per_section() {
                let checkpoint = format!("section-{}", index + 1);
                self.recorder
                    .checkpoint(diagnostics, session, &checkpoint)
                    .await;
            }
            fragments.push(fragment);
        }

        let merged = tokio::task::spawn_blocking(move || merge(&fragments))
            .await
            .map_err(|err| HandbookError::Internal(format!("merge task failed: {err}")))??;
        if merged.page_count != total {
            return Err(HandbookError::merge(format!(
                "merged document has {} pages for {total} sections",
                merged.page_count
            )));
        }
        tracker.advance(PipelineState::Merged {
            pages: merged.page_count,
        })?;
        Ok(merged)
    }

    async fn persist(
        &self,
        document: &MergedDocument,
        tracker: &mut StateTracker,
    ) -> Result<OutputArtifact> {
        let artifact = self.store.persist(document).await?;
        tracker.advance(PipelineState::Persisted)?;
        tracker.advance(PipelineState::Done)?;
        Ok(artifact)
    }

    /// Classify, record diagnostics (before release), and hand the error back.
    async fn fail(
        &self,
        tracker: &mut StateTracker,
        diagnostics: &mut DiagnosticContext,
        session: Option<&mut RenderSession>,
        err: HandbookError,
    ) -> HandbookError {
        let last = tracker.current().clone();
        tracker.fail(err.kind());
        warn!(kind = %err.kind(), state = ?last, error = %err, "generation failed");
        self.recorder
            .record_failure(diagnostics, session, &err, &last)
            .await;
        err
    }
}
