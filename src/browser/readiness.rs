//! Navigation plus the "page is fully loaded" decision.
//!
//! A page is ready once the network has been idle for `idle_interval` and
//! the configured [`ReadinessCheck`] confirms it. Failed attempts are retried
//! up to `retries` times; every attempt stays inside the navigation budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Config, ReadinessStrategy};
use crate::{HandbookError, Result};

use super::driver::{NavigationOutcome, PageDriver};

/// Extra confirmation run once the network has gone quiet.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(false)` means "not yet"; the caller keeps polling.
    async fn confirm(&self, driver: &mut dyn PageDriver) -> Result<bool>;
}

/// Network idle alone is enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkIdle;

#[async_trait]
impl ReadinessCheck for NetworkIdle {
    fn name(&self) -> &'static str {
        "network-idle"
    }

    async fn confirm(&self, _driver: &mut dyn PageDriver) -> Result<bool> {
        Ok(true)
    }
}

/// Network idle, plus document, fonts, images and stylesheets all complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetComplete;

#[async_trait]
impl ReadinessCheck for AssetComplete {
    fn name(&self) -> &'static str {
        "asset-complete"
    }

    async fn confirm(&self, driver: &mut dyn PageDriver) -> Result<bool> {
        let probe = driver.probe_assets().await?;
        if !probe.is_complete() {
            debug!(?probe, "assets still loading");
        }
        Ok(probe.is_complete())
    }
}

impl ReadinessStrategy {
    pub fn check(&self) -> Arc<dyn ReadinessCheck> {
        match self {
            ReadinessStrategy::NetworkIdle => Arc::new(NetworkIdle),
            ReadinessStrategy::AssetComplete => Arc::new(AssetComplete),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Total budget for navigation and every readiness attempt.
    pub navigation_timeout: Duration,
    pub idle_interval: Duration,
    pub poll_interval: Duration,
    pub attempt_timeout: Duration,
    pub retries: u32,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ReadinessOptions {
    fn from(config: &Config) -> Self {
        Self {
            navigation_timeout: config.timeouts.navigation,
            idle_interval: config.readiness.idle_interval,
            poll_interval: config.readiness.poll_interval,
            attempt_timeout: config.readiness.attempt_timeout,
            retries: config.readiness.retries,
        }
    }
}

/// Navigate to `url` and block until the page is ready.
///
/// Returns `TimeoutError` when the budget runs out before readiness and
/// `PageLoadError` when the main document answers with a failing status.
pub async fn navigate(
    driver: &mut dyn PageDriver,
    url: &Url,
    check: &dyn ReadinessCheck,
    options: &ReadinessOptions,
) -> Result<NavigationOutcome> {
    let started = Instant::now();
    let deadline = started + options.navigation_timeout;

    let outcome = match timeout(options.navigation_timeout, driver.goto(url)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(HandbookError::timeout(format!(
                "navigation to {url} did not complete within {:?}",
                options.navigation_timeout
            )))
        }
    };
    if !outcome.is_success() {
        return Err(HandbookError::page_load(format!(
            "{url} answered with HTTP {}",
            outcome.status.unwrap_or_default()
        )));
    }
    debug!(status = ?outcome.status, "document loaded");

    let attempts = options.retries.saturating_add(1);
    for attempt in 1..=attempts {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let attempt_deadline = deadline.min(now + options.attempt_timeout);
        if wait_until_ready(driver, check, options, attempt_deadline).await {
            info!(
                strategy = check.name(),
                attempt,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "page ready"
            );
            return Ok(outcome);
        }
        if attempt < attempts {
            warn!(strategy = check.name(), attempt, "page not ready, retrying");
        }
    }

    Err(HandbookError::timeout(format!(
        "page did not become ready ({}) within {:?}",
        check.name(),
        options.navigation_timeout
    )))
}

/// One readiness attempt. Probe failures count as "not ready yet".
async fn wait_until_ready(
    driver: &mut dyn PageDriver,
    check: &dyn ReadinessCheck,
    options: &ReadinessOptions,
    deadline: Instant,
) -> bool {
    let mut quiet_since: Option<Instant> = None;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }

        if driver.in_flight_requests() == 0 {
            let since = *quiet_since.get_or_insert(now);
            if now.duration_since(since) >= options.idle_interval {
                match check.confirm(driver).await {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(err) => debug!(error = %err, "readiness probe failed"),
                }
            }
        } else {
            quiet_since = None;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(options.poll_interval.min(remaining)).await;
    }
}
