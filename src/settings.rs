use std::path::Path;
use std::time::Duration;

use handbook_pdf::{Config, HandbookError};
use tracing::debug;

use crate::cli::PipelineArgs;

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/handbook-pdf/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, HandbookError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        HandbookError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        HandbookError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Apply CLI/env overrides on top of the loaded config, then re-validate.
pub fn apply_overrides(mut config: Config, args: &PipelineArgs) -> Result<Config, HandbookError> {
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(chrome) = &args.chrome {
        config.browser.chrome_executable = Some(chrome.clone());
    }
    if let Some(readiness) = args.readiness {
        config.readiness.strategy = readiness.into();
    }
    if let Some(secs) = args.nav_timeout {
        config.timeouts.navigation = Duration::from_secs(secs);
    }
    if let Some(ms) = args.settle_delay_ms {
        config.sections.settle_delay = Duration::from_millis(ms);
    }
    if let Some(page_size) = args.page_size {
        config.browser.page_size = page_size;
    }
    if let Some(kinds) = &args.block {
        config.browser.blocked_resource_types = kinds.clone();
    }
    if args.no_diagnostics {
        config.diagnostics.enabled = false;
    }
    if args.per_section_diagnostics {
        config.diagnostics.per_section = true;
    }

    config
        .validate()
        .map_err(|e| HandbookError::Config(format!("Invalid settings: {e}")))?;
    Ok(config)
}

/// Log effective config at debug level (visible with --verbose).
pub fn log_effective_config(config: &Config, config_source: Option<&Path>) {
    debug!("{}", format_effective_config(config, config_source));
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let blocked = if config.browser.blocked_resource_types.is_empty() {
        "none".to_string()
    } else {
        config
            .browser
            .blocked_resource_types
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "Effective config [{source}]: output={}, page={}, readiness={} (idle {:?}, retries {}), sections='{} {}' (settle {:?}), timeouts: launch={:?}, nav={:?}, capture={:?}, blocked={}, diagnostics={}",
        config.output_dir.display(),
        config.browser.page_size,
        config.readiness.strategy,
        config.readiness.idle_interval,
        config.readiness.retries,
        config.sections.container,
        config.sections.item,
        config.sections.settle_delay,
        config.timeouts.launch,
        config.timeouts.navigation,
        config.timeouts.capture,
        blocked,
        if config.diagnostics.enabled {
            if config.diagnostics.per_section {
                "on (per section)"
            } else {
                "on"
            }
        } else {
            "off"
        }
    )
}
