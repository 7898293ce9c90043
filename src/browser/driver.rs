//! Engine seam: the operations the pipeline needs from one browser page.
//!
//! [`ChromeLauncher`](super::ChromeLauncher) drives Chrome over CDP;
//! [`MemoryLauncher`](super::MemoryLauncher) serves an in-memory document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sections::SectionSelectors;
use crate::Result;

use super::session::BrowserOptions;

/// Starts one isolated engine instance with one page.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn PageDriver>>;
}

/// One page inside one engine instance. Owned by exactly one render session.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate and wait for the engine's own load signal.
    async fn goto(&mut self, url: &Url) -> Result<NavigationOutcome>;

    /// Network requests started but not yet finished or failed.
    fn in_flight_requests(&mut self) -> usize;

    async fn probe_assets(&mut self) -> Result<AssetProbe>;

    /// Elements matching the section selectors, in DOM order.
    async fn query_sections(&mut self, selectors: &SectionSelectors) -> Result<Vec<SectionProbe>>;

    /// Mark section `index` visible and every other section hidden.
    async fn show_only_section(
        &mut self,
        selectors: &SectionSelectors,
        index: usize,
    ) -> Result<VisibilityReport>;

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>>;

    /// Full-page PNG.
    async fn screenshot(&mut self) -> Result<Vec<u8>>;

    /// Serialized DOM of the current document.
    async fn html(&mut self) -> Result<String>;

    fn take_console(&mut self) -> Vec<ConsoleEntry>;

    fn take_network(&mut self) -> Vec<NetworkEntry>;

    /// Terminate the engine process. Called at most once per driver.
    async fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationOutcome {
    /// Main document status, when the engine reported one.
    pub status: Option<u16>,
    pub final_url: Option<String>,
}

impl NavigationOutcome {
    /// 2xx and 3xx count as success; a missing status (e.g. `about:`/`data:` URLs) too.
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |status| (200..400).contains(&status))
    }
}

/// In-page snapshot of asset loading state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetProbe {
    pub ready_state: String,
    pub fonts_loaded: bool,
    pub images_pending: u32,
    pub stylesheets_pending: u32,
}

impl AssetProbe {
    pub fn is_complete(&self) -> bool {
        self.ready_state == "complete"
            && self.fonts_loaded
            && self.images_pending == 0
            && self.stylesheets_pending == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProbe {
    pub index: usize,
    pub tag: String,
    pub id: Option<String>,
    /// Text of the first heading inside the section, trimmed.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityReport {
    pub total: usize,
    pub visible: Vec<usize>,
}

/// Print parameters for one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub print_background: bool,
    pub margin_in: f64,
    pub page_ranges: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub request_id: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
