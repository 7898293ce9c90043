//! Headless browser sessions for rendering handbook pages.
//!
//! # Module Structure
//!
//! - [`driver`] - The page operations the pipeline relies on
//! - [`session`] - Render sessions with concurrency control
//! - [`readiness`] - Navigation and the fully-loaded decision
//! - [`chrome`] - Chrome/Chromium over the DevTools protocol
//! - [`memory`] - Scripted in-memory engine
//! - [`scripts`] - In-page JavaScript
//!
//! # Example
//!
//! ```no_run
//! use handbook_pdf::{BrowserOptions, SessionManager};
//!
//! # async fn example() -> handbook_pdf::Result<()> {
//! let sessions = SessionManager::chrome(BrowserOptions::default());
//! let mut session = sessions.acquire().await?;
//! let html = session.driver()?.html().await?;
//! println!("{} bytes of about:blank", html.len());
//! session.release().await;
//! # Ok(())
//! # }
//! ```

pub mod chrome;
pub mod driver;
pub mod memory;
pub mod readiness;
pub mod scripts;
pub mod session;

pub use chrome::{ChromeDriver, ChromeLauncher};
pub use driver::{
    AssetProbe, BrowserLauncher, ConsoleEntry, NavigationOutcome, NetworkEntry, PageDriver,
    PrintOptions, SectionProbe, VisibilityReport,
};
pub use memory::{render_text_page, MemoryDocument, MemoryLauncher};
pub use readiness::{navigate, AssetComplete, NetworkIdle, ReadinessCheck, ReadinessOptions};
pub use session::{
    BrowserOptions, RenderSession, SessionManager, DEFAULT_LAUNCH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
