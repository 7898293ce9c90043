//! Render sessions: one browser instance per request, bounded by a semaphore.
//!
//! A [`RenderSession`] owns its engine exclusively. It is released exactly
//! once, either explicitly through [`RenderSession::release`] or, as a last
//! resort, when it is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{Config, ResourceKind};
use crate::{HandbookError, Result, Viewport};

use super::chrome::ChromeLauncher;
use super::driver::{BrowserLauncher, PageDriver};

/// Default timeout for starting the browser process.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single CDP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Launch-time settings shared by every session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit Chrome/Chromium executable; auto-detected when `None`.
    pub chrome_executable: Option<PathBuf>,
    /// Viewport, and the printed page size.
    pub viewport: Viewport,
    pub headless: bool,
    pub sandbox: bool,
    pub launch_timeout: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_sessions: usize,
    pub blocked_resource_types: Vec<ResourceKind>,
    pub emulate_media: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            viewport: Viewport::default(),
            headless: true,
            sandbox: true,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_sessions: 2,
            blocked_resource_types: Vec::new(),
            emulate_media: Some("screen".to_string()),
            user_agent: None,
        }
    }
}

impl From<&Config> for BrowserOptions {
    fn from(config: &Config) -> Self {
        let browser = &config.browser;
        Self {
            chrome_executable: browser.chrome_executable.clone(),
            viewport: browser.page_size,
            headless: browser.headless,
            sandbox: browser.sandbox,
            launch_timeout: config.timeouts.launch,
            request_timeout: config.timeouts.navigation.max(DEFAULT_REQUEST_TIMEOUT),
            max_concurrent_sessions: browser.max_concurrent_sessions,
            blocked_resource_types: browser.blocked_resource_types.clone(),
            emulate_media: browser.emulate_media.clone(),
            user_agent: browser.user_agent.clone(),
        }
    }
}

/// Hands out render sessions, never more than `max_concurrent_sessions` at once.
#[derive(Clone)]
pub struct SessionManager {
    options: BrowserOptions,
    launcher: Arc<dyn BrowserLauncher>,
    semaphore: Arc<Semaphore>,
    live: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("options", &self.options)
            .field("available_permits", &self.semaphore.available_permits())
            .field("live", &self.live.load(Ordering::SeqCst))
            .finish()
    }
}

impl SessionManager {
    pub fn new(options: BrowserOptions, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            options,
            launcher,
            semaphore: Arc::new(Semaphore::new(permits)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions backed by a local Chrome/Chromium.
    pub fn chrome(options: BrowserOptions) -> Self {
        Self::new(options, Arc::new(ChromeLauncher))
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    /// Sessions acquired and not yet released.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait for a free slot, then launch a fresh engine for the caller.
    pub async fn acquire(&self) -> Result<RenderSession> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HandbookError::Internal("Session manager closed".to_string()))?;

        let launch = self.launcher.launch(&self.options);
        let driver = match timeout(self.options.launch_timeout, launch).await {
            Ok(Ok(driver)) => driver,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(HandbookError::launch(format!(
                    "browser did not start within {:?}",
                    self.options.launch_timeout
                )))
            }
        };

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(live = self.live_sessions(), "render session acquired");
        Ok(RenderSession {
            driver: Some(driver),
            _permit: permit,
            live: LiveGuard(Some(self.live.clone())),
        })
    }
}

/// Decrements the live-session counter once.
struct LiveGuard(Option<Arc<AtomicUsize>>);

impl LiveGuard {
    fn disarm(&mut self) {
        if let Some(live) = self.0.take() {
            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// One exclusive browser instance.
pub struct RenderSession {
    driver: Option<Box<dyn PageDriver>>,
    _permit: OwnedSemaphorePermit,
    live: LiveGuard,
}

impl RenderSession {
    /// The page, while the session is still open.
    pub fn driver(&mut self) -> Result<&mut (dyn PageDriver + 'static)> {
        self.driver
            .as_deref_mut()
            .ok_or_else(|| HandbookError::Internal("render session already released".to_string()))
    }

    pub fn is_released(&self) -> bool {
        self.driver.is_none()
    }

    /// Close the engine. Safe to call more than once; close failures are logged, not returned.
    pub async fn release(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(err) = driver.close().await {
                warn!(error = %err, "browser did not close cleanly");
            }
            self.live.disarm();
            debug!("render session released");
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if self.driver.is_some() {
            warn!("render session dropped without release; engine torn down on drop");
        }
    }
}
