//! Chrome/Chromium over the DevTools protocol (chromiumoxide).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::cdp::js_protocol::runtime::{
    self, EvaluateParams, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::ResourceKind;
use crate::sections::SectionSelectors;
use crate::{HandbookError, Result};

use super::driver::{
    AssetProbe, BrowserLauncher, ConsoleEntry, NavigationOutcome, NetworkEntry, PageDriver,
    PrintOptions, SectionProbe, VisibilityReport,
};
use super::scripts;
use super::session::BrowserOptions;

/// Launches a fresh local Chrome for every session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &BrowserOptions) -> Result<Box<dyn PageDriver>> {
        let driver = ChromeDriver::launch(options).await?;
        Ok(Box::new(driver))
    }
}

/// Where a CDP call failed; decides the error kind when it is not a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Launch,
    Navigation,
    Evaluate,
    Print,
}

pub(crate) fn map_cdp_error(stage: Stage, err: CdpError) -> HandbookError {
    if matches!(err, CdpError::Timeout) {
        return HandbookError::timeout(format!("browser did not answer in time ({stage:?})"));
    }
    map_engine_message(stage, err.to_string())
}

pub(crate) fn map_engine_message(stage: Stage, message: String) -> HandbookError {
    if message.to_ascii_lowercase().contains("timeout")
        || message.to_ascii_lowercase().contains("timed out")
    {
        return HandbookError::timeout(message);
    }
    match stage {
        Stage::Launch => HandbookError::launch(message),
        Stage::Navigation => HandbookError::page_load(message),
        Stage::Evaluate | Stage::Print => HandbookError::capture(message),
    }
}

fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Font => ResourceType::Font,
        ResourceKind::Stylesheet => ResourceType::Stylesheet,
        ResourceKind::Media => ResourceType::Media,
        ResourceKind::Script => ResourceType::Script,
        ResourceKind::Xhr => ResourceType::Xhr,
        ResourceKind::Fetch => ResourceType::Fetch,
        ResourceKind::Websocket => ResourceType::WebSocket,
        ResourceKind::Other => ResourceType::Other,
    }
}

/// Request bookkeeping fed by CDP events.
#[derive(Debug, Default)]
struct PageState {
    in_flight: HashSet<String>,
    /// Status of the first document response since the last navigation.
    document_status: Option<u16>,
    console: Vec<ConsoleEntry>,
    network: Vec<NetworkEntry>,
    network_index: HashMap<String, usize>,
}

impl PageState {
    fn started(&mut self, event: &EventRequestWillBeSent) {
        let id = event.request_id.inner().clone();
        self.in_flight.insert(id.clone());
        let entry = NetworkEntry {
            request_id: id.clone(),
            method: event.request.method.clone(),
            url: event.request.url.clone(),
            resource_type: event.r#type.as_ref().map(|kind| format!("{kind:?}")),
            status: None,
            error: None,
        };
        self.network_index.insert(id, self.network.len());
        self.network.push(entry);
    }

    fn responded(&mut self, event: &EventResponseReceived) {
        let status = u16::try_from(event.response.status).ok();
        if event.r#type == ResourceType::Document && self.document_status.is_none() {
            self.document_status = status;
        }
        if let Some(entry) = self.entry_mut(event.request_id.inner()) {
            entry.status = status;
        }
    }

    fn finished(&mut self, request_id: &str) {
        self.in_flight.remove(request_id);
    }

    fn failed(&mut self, event: &EventLoadingFailed) {
        self.in_flight.remove(event.request_id.inner());
        if let Some(entry) = self.entry_mut(event.request_id.inner()) {
            entry.error = Some(event.error_text.clone());
        }
    }

    fn entry_mut(&mut self, request_id: &str) -> Option<&mut NetworkEntry> {
        let index = *self.network_index.get(request_id)?;
        self.network.get_mut(index)
    }
}

fn lock(state: &Mutex<PageState>) -> MutexGuard<'_, PageState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One Chrome process with one page.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
    state: Arc<Mutex<PageState>>,
    // Declared last so the profile outlives the browser on drop.
    _profile: TempDir,
}

/// A throwaway user-data directory; concurrent sessions never share cookies, cache or locks.
fn session_profile() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("handbook-pdf-profile-")
        .tempdir()
        .map_err(|err| HandbookError::launch(format!("could not create browser profile: {err}")))
}

impl ChromeDriver {
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let profile = session_profile()?;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(options.request_timeout)
            .arg("--hide-scrollbars")
            .arg("--disable-background-networking")
            .arg("--disable-background-timer-throttling")
            .arg("--no-first-run");
        if !options.headless {
            builder = builder.with_head();
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(HandbookError::launch)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| map_cdp_error(Stage::Launch, err))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    trace!(error = %err, "browser handler event error");
                }
            }
        });

        match Self::open_page(&browser, options).await {
            Ok((page, tasks, state)) => {
                debug!(
                    viewport = %options.viewport,
                    headless = options.headless,
                    profile = %profile.path().display(),
                    "browser launched"
                );
                Ok(Self {
                    browser,
                    page,
                    handler: Some(handler_task),
                    tasks,
                    state,
                    _profile: profile,
                })
            }
            Err(err) => {
                handler_task.abort();
                let _ = browser.kill().await;
                Err(err)
            }
        }
    }

    async fn open_page(
        browser: &Browser,
        options: &BrowserOptions,
    ) -> Result<(Page, Vec<JoinHandle<()>>, Arc<Mutex<PageState>>)> {
        let setup = |err| map_cdp_error(Stage::Launch, err);
        let page = browser.new_page("about:blank").await.map_err(setup)?;

        page.execute(network::EnableParams::default())
            .await
            .map_err(setup)?;
        page.execute(runtime::EnableParams::default())
            .await
            .map_err(setup)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(options.viewport.width),
            i64::from(options.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(setup)?;
        if let Some(media) = &options.emulate_media {
            page.execute(SetEmulatedMediaParams::builder().media(media.clone()).build())
                .await
                .map_err(setup)?;
        }
        if let Some(agent) = &options.user_agent {
            page.execute(SetUserAgentOverrideParams::new(agent.clone()))
                .await
                .map_err(setup)?;
        }

        let state = Arc::new(Mutex::new(PageState::default()));
        let mut tasks = Vec::new();

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                lock(&shared).started(&event);
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                lock(&shared).responded(&event);
            }
        }));

        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                lock(&shared).finished(event.request_id.inner());
            }
        }));

        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                lock(&shared).failed(&event);
            }
        }));

        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = console.next().await {
                let text = event
                    .args
                    .iter()
                    .map(|arg| match (&arg.value, &arg.description) {
                        (Some(serde_json::Value::String(s)), _) => s.clone(),
                        (Some(value), _) => value.to_string(),
                        (None, Some(description)) => description.clone(),
                        (None, None) => String::new(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                lock(&shared).console.push(ConsoleEntry {
                    level: format!("{:?}", event.r#type).to_ascii_lowercase(),
                    text,
                });
            }
        }));

        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(setup)?;
        let shared = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|exception| exception.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                lock(&shared).console.push(ConsoleEntry {
                    level: "exception".to_string(),
                    text,
                });
            }
        }));

        if !options.blocked_resource_types.is_empty() {
            tasks.push(Self::block_resources(&page, &options.blocked_resource_types).await?);
        }

        Ok((page, tasks, state))
    }

    /// Fail requests of the given kinds before they hit the network.
    async fn block_resources(page: &Page, kinds: &[ResourceKind]) -> Result<JoinHandle<()>> {
        let setup = |err| map_cdp_error(Stage::Launch, err);
        let patterns = kinds
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .resource_type(resource_type(*kind))
                    .request_stage(RequestStage::Request)
                    .build()
            })
            .collect::<Vec<_>>();

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(setup)?;
        page.execute(fetch::EnableParams::builder().patterns(patterns).build())
            .await
            .map_err(setup)?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                trace!(url = %event.request.url, "blocking request");
                let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if let Err(err) = page.execute(fail).await {
                    debug!(error = %err, "could not fail blocked request");
                }
            }
        }))
    }

    async fn evaluate<T: DeserializeOwned + Send>(&self, expression: &str) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(HandbookError::capture)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|err| map_cdp_error(Stage::Evaluate, err))?;
        result
            .into_value::<T>()
            .map_err(|err| HandbookError::capture(format!("unexpected script result: {err}")))
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&mut self, url: &Url) -> Result<NavigationOutcome> {
        lock(&self.state).document_status = None;
        self.page
            .goto(url.as_str())
            .await
            .map_err(|err| map_cdp_error(Stage::Navigation, err))?;
        let final_url = self.page.url().await.ok().flatten();
        let status = lock(&self.state).document_status;
        Ok(NavigationOutcome { status, final_url })
    }

    fn in_flight_requests(&mut self) -> usize {
        lock(&self.state).in_flight.len()
    }

    async fn probe_assets(&mut self) -> Result<AssetProbe> {
        self.evaluate(scripts::ASSET_PROBE).await
    }

    async fn query_sections(&mut self, selectors: &SectionSelectors) -> Result<Vec<SectionProbe>> {
        self.evaluate(&scripts::query_sections(selectors)).await
    }

    async fn show_only_section(
        &mut self,
        selectors: &SectionSelectors,
        index: usize,
    ) -> Result<VisibilityReport> {
        self.evaluate(&scripts::show_only_section(selectors, index))
            .await
    }

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .print_background(options.print_background)
            .paper_width(options.paper_width_in)
            .paper_height(options.paper_height_in)
            .margin_top(options.margin_in)
            .margin_bottom(options.margin_in)
            .margin_left(options.margin_in)
            .margin_right(options.margin_in)
            .page_ranges(options.page_ranges.clone())
            .build();
        self.page
            .pdf(params)
            .await
            .map_err(|err| map_cdp_error(Stage::Print, err))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|err| map_cdp_error(Stage::Print, err))
    }

    async fn html(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|err| map_cdp_error(Stage::Evaluate, err))
    }

    fn take_console(&mut self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut lock(&self.state).console)
    }

    fn take_network(&mut self) -> Vec<NetworkEntry> {
        let mut state = lock(&self.state);
        state.network_index.clear();
        std::mem::take(&mut state.network)
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown().await.map(|_| ())
    }
}

/// How a Chrome process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Graceful,
    Killed,
}

impl ChromeDriver {
    async fn shutdown(&mut self) -> Result<Shutdown> {
        // The CDP handler must still be running for `Browser::close` to get its reply.
        let outcome = match self.browser.close().await {
            Ok(_) => {
                if let Err(err) = self.browser.wait().await {
                    debug!(error = %err, "waiting for browser exit failed");
                }
                Ok(Shutdown::Graceful)
            }
            Err(err) => {
                warn!(error = %err, "graceful browser close failed; killing process");
                match self.browser.kill().await {
                    Some(Err(err)) => Err(HandbookError::Internal(format!(
                        "could not kill browser process: {err}"
                    ))),
                    _ => Ok(Shutdown::Killed),
                }
            }
        };
        self.stop_tasks();
        outcome
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

/// Listener tasks die with the driver; `Browser`'s own drop kills the process.
impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}
