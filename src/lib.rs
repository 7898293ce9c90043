//! Handbook PDF Library
//!
//! Turns a long, sectioned handbook web page into a paginated PDF: a headless
//! browser loads the page, each section is shown on its own and printed as
//! one page, and the pages are merged in document order into a uniquely named
//! file.
//!
//! # Module Overview
//!
//! - [`browser`] - Headless browser sessions, navigation and load-readiness
//! - [`sections`] - Locating the ordered section set
//! - [`visibility`] - Showing exactly one section at a time
//! - [`capture`] - Printing the visible section to a single-page PDF
//! - [`merge`] - Concatenating page fragments
//! - [`diagnostics`] - Per-request failure and checkpoint bundles
//! - [`storage`] - Unique, atomically written output files
//! - [`pipeline`] - The orchestrator and its state machine
//! - [`server`] - HTTP adapter
//! - [`config`] - Configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use handbook_pdf::{Config, Pipeline};
//!
//! # async fn example() -> handbook_pdf::Result<()> {
//! let pipeline = Pipeline::new(&Config::default())?;
//! let artifact = pipeline
//!     .generate("https://example.com/handbook?print=true")
//!     .await?;
//! println!("wrote {}", artifact.filepath.display());
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod sections;
pub mod server;
pub mod storage;
pub mod viewport;
pub mod visibility;

pub use browser::{
    BrowserLauncher, BrowserOptions, ChromeLauncher, MemoryDocument, MemoryLauncher, PageDriver,
    ReadinessCheck, RenderSession, SessionManager,
};
pub use capture::{CaptureEngine, PageFragment};
pub use config::Config;
pub use diagnostics::{DiagnosticBundle, DiagnosticContext, DiagnosticRecorder};
pub use error::{ErrorKind, ErrorPayload, HandbookError, Result};
pub use merge::{merge, MergedDocument};
pub use output::{ErrorOutput, GenerateOutput, HandbookOutput, HANDBOOK_OUTPUT_VERSION};
pub use pipeline::{
    GenerationReport, GenerationRequest, Pipeline, PipelineState, RequestId, StateTracker,
};
pub use sections::{locate, SectionHandle, SectionSelectors, SectionSet};
pub use storage::{OutputArtifact, OutputStore};
pub use viewport::Viewport;
pub use visibility::{IsolatedSection, VisibilityController};
