use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Viewport;

/// File name looked up under the user's config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where merged PDFs are written; diagnostics live in `<output_dir>/diagnostics`.
    pub output_dir: PathBuf,
    pub browser: BrowserSettings,
    pub readiness: ReadinessSettings,
    pub sections: SectionSettings,
    pub timeouts: Timeouts,
    pub diagnostics: DiagnosticSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            browser: BrowserSettings::default(),
            readiness: ReadinessSettings::default(),
            sections: SectionSettings::default(),
            timeouts: Timeouts::default(),
            diagnostics: DiagnosticSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub page_size: Viewport,
    pub max_concurrent_sessions: usize,
    pub blocked_resource_types: Vec<ResourceKind>,
    /// CSS media type emulated before capture; `None` keeps the browser's print media.
    pub emulate_media: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
            sandbox: true,
            page_size: Viewport::default(),
            max_concurrent_sessions: 2,
            blocked_resource_types: Vec::new(),
            emulate_media: Some("screen".to_string()),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSettings {
    pub strategy: ReadinessStrategy,
    /// How long the network must stay quiet before the page counts as idle.
    #[serde(with = "humantime_serde")]
    pub idle_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Ceiling for one readiness attempt; the navigation timeout still bounds the total.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
    pub retries: u32,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            strategy: ReadinessStrategy::AssetComplete,
            idle_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(30),
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionSettings {
    pub container: String,
    pub item: String,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for SectionSettings {
    fn default() -> Self {
        Self {
            container: "#handbook-pages".to_string(),
            item: ".type-handbook-page".to_string(),
            settle_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub launch: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub capture: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(90),
            capture: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticSettings {
    pub enabled: bool,
    pub per_section: bool,
    /// Root for per-request bundles; `<output_dir>/diagnostics` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Bound on screenshot/HTML grabs so a wedged page cannot stall failure handling.
    #[serde(with = "humantime_serde")]
    pub grab_timeout: Duration,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            per_section: false,
            directory: None,
            grab_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessStrategy {
    NetworkIdle,
    #[default]
    AssetComplete,
}

impl fmt::Display for ReadinessStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessStrategy::NetworkIdle => f.write_str("network-idle"),
            ReadinessStrategy::AssetComplete => f.write_str("asset-complete"),
        }
    }
}

/// Request categories that can be blocked while the handbook loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Image,
    Font,
    Stylesheet,
    Media,
    Script,
    Xhr,
    Fetch,
    Websocket,
    Other,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Image,
        ResourceKind::Font,
        ResourceKind::Stylesheet,
        ResourceKind::Media,
        ResourceKind::Script,
        ResourceKind::Xhr,
        ResourceKind::Fetch,
        ResourceKind::Websocket,
        ResourceKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Font => "font",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Media => "media",
            ResourceKind::Script => "script",
            ResourceKind::Xhr => "xhr",
            ResourceKind::Fetch => "fetch",
            ResourceKind::Websocket => "websocket",
            ResourceKind::Other => "other",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown resource kind '{0}'. Supported: image, font, stylesheet, media, script, xhr, fetch, websocket, other.")]
pub struct ResourceKindParseError(String);

impl FromStr for ResourceKind {
    type Err = ResourceKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| ResourceKindParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// `~/.config/handbook-pdf/config.toml` (platform equivalent), if a config dir exists.
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("handbook-pdf").join(CONFIG_FILE_NAME))
    }

    /// Load config. Priority: explicit path > central config > defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigLoadError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::central_config_path() {
            Some(central) if central.is_file() => Self::from_file(&central),
            _ => Ok(Config::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Config, ConfigLoadError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.diagnostics
            .directory
            .clone()
            .unwrap_or_else(|| self.output_dir.join("diagnostics"))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sections.container.trim().is_empty() {
            return Err("sections.container must not be empty".to_string());
        }
        if self.sections.item.trim().is_empty() {
            return Err("sections.item must not be empty".to_string());
        }
        if self.browser.page_size.width == 0 || self.browser.page_size.height == 0 {
            return Err(format!(
                "browser.page_size must be positive (got {})",
                self.browser.page_size
            ));
        }
        for (name, value) in [
            ("timeouts.launch", self.timeouts.launch),
            ("timeouts.navigation", self.timeouts.navigation),
            ("timeouts.capture", self.timeouts.capture),
            ("readiness.poll_interval", self.readiness.poll_interval),
            ("readiness.attempt_timeout", self.readiness.attempt_timeout),
        ] {
            if value.is_zero() {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.browser.page_size.width, 794);
        assert_eq!(cfg.browser.page_size.height, 1123);
        assert_eq!(cfg.sections.container, "#handbook-pages");
        assert_eq!(cfg.sections.item, ".type-handbook-page");
        assert_eq!(cfg.readiness.strategy, ReadinessStrategy::AssetComplete);
        assert_eq!(cfg.readiness.retries, 2);
        assert_eq!(cfg.timeouts.navigation, Duration::from_secs(90));
        assert_eq!(cfg.sections.settle_delay, Duration::from_millis(250));
        assert!(cfg.browser.sandbox);
        assert!(cfg.diagnostics.enabled);
        assert_eq!(cfg.diagnostics_dir(), PathBuf::from("output/diagnostics"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_overrides_nested_values_and_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
output_dir = "/srv/handbooks"

[browser]
page_size = { width = 1240, height = 1754 }
blocked_resource_types = ["media", "websocket"]

[readiness]
strategy = "network-idle"
idle_interval = "750ms"

[sections]
settle_delay = "1s"

[timeouts]
navigation = "2m"
"#,
        )
        .expect("parse config");

        assert_eq!(cfg.output_dir, PathBuf::from("/srv/handbooks"));
        assert_eq!(cfg.browser.page_size.width, 1240);
        assert_eq!(
            cfg.browser.blocked_resource_types,
            vec![ResourceKind::Media, ResourceKind::Websocket]
        );
        assert_eq!(cfg.readiness.strategy, ReadinessStrategy::NetworkIdle);
        assert_eq!(cfg.readiness.idle_interval, Duration::from_millis(750));
        assert_eq!(cfg.sections.settle_delay, Duration::from_secs(1));
        assert_eq!(cfg.timeouts.navigation, Duration::from_secs(120));
        assert_eq!(cfg.timeouts.capture, Duration::from_secs(30));
        assert_eq!(cfg.sections.item, ".type-handbook-page");
    }

    #[test]
    fn diagnostics_can_live_outside_the_output_dir() {
        let cfg = Config::from_toml("[diagnostics]\ndirectory = \"/var/log/handbook\"\n").unwrap();
        assert_eq!(cfg.diagnostics_dir(), PathBuf::from("/var/log/handbook"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("threshold = 0.9\n").is_err());
        assert!(Config::from_toml("[browser]\nblocked_resource_types = [\"video\"]\n").is_err());
    }

    #[test]
    fn validate_rejects_empty_selectors_and_zero_timeouts() {
        let mut cfg = Config::default();
        cfg.sections.item = "  ".to_string();
        assert!(cfg.validate().unwrap_err().contains("sections.item"));

        let mut cfg = Config::default();
        cfg.timeouts.capture = Duration::ZERO;
        assert!(cfg.validate().unwrap_err().contains("timeouts.capture"));
    }

    #[test]
    fn resource_kind_parses_case_insensitively() {
        assert_eq!("Image".parse::<ResourceKind>().unwrap(), ResourceKind::Image);
        assert_eq!(" xhr ".parse::<ResourceKind>().unwrap(), ResourceKind::Xhr);
        assert!("video".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let missing = Path::new("/definitely/not/here/handbook.toml");
        assert!(Config::load(Some(missing)).is_err());
    }
}
