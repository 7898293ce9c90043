use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum HandbookError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Page load failed: {0}")]
    PageLoad(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("No sections found matching '{selector}'")]
    NoSectionsFound { selector: String },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Internal(String),
}

impl HandbookError {
    pub fn launch(message: impl Into<String>) -> Self {
        HandbookError::Launch(message.into())
    }

    pub fn page_load(message: impl Into<String>) -> Self {
        HandbookError::PageLoad(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        HandbookError::Timeout(message.into())
    }

    pub fn capture(message: impl Into<String>) -> Self {
        HandbookError::Capture(message.into())
    }

    pub fn merge(message: impl Into<String>) -> Self {
        HandbookError::Merge(message.into())
    }

    pub fn persist(message: impl Into<String>) -> Self {
        HandbookError::Persist(message.into())
    }

    /// Classification surfaced at the pipeline boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandbookError::Launch(_) => ErrorKind::Launch,
            HandbookError::PageLoad(_) => ErrorKind::PageLoad,
            HandbookError::Timeout(_) => ErrorKind::Timeout,
            HandbookError::NoSectionsFound { .. } => ErrorKind::NoSectionsFound,
            HandbookError::Capture(_) => ErrorKind::Capture,
            HandbookError::Merge(_) => ErrorKind::Merge,
            HandbookError::Persist(_) | HandbookError::Io(_) => ErrorKind::Persist,
            HandbookError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            HandbookError::Config(_) => ErrorKind::Config,
            HandbookError::Serialization(_) | HandbookError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let remediation = match self {
            HandbookError::Launch(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("could not auto detect") || lower.contains("not found") {
                    "Install Chrome/Chromium or point --chrome (HANDBOOK_PDF_CHROME) at the browser executable."
                } else if lower.contains("sandbox") {
                    "The browser sandbox could not start; run inside a container that allows it or set browser.sandbox = false."
                } else {
                    "Check that the browser executable starts on this host and that --chrome points at it."
                }
            }
            HandbookError::PageLoad(_) => {
                "Verify the handbook URL is reachable and returns a successful status."
            }
            HandbookError::Timeout(_) => {
                "Try increasing --nav-timeout or switching --readiness to network-idle; check for assets that never finish loading."
            }
            HandbookError::NoSectionsFound { .. } => {
                "Check sections.container/sections.item selectors and that the URL renders the print view (print=true)."
            }
            HandbookError::Capture(_) => {
                "Re-run with --verbose and inspect the diagnostics bundle for the failing section."
            }
            HandbookError::Merge(_) => {
                "A captured page was not a valid single-page PDF; inspect the diagnostics bundle."
            }
            HandbookError::Persist(_) | HandbookError::Io(_) => {
                "Check that the output directory exists and is writable."
            }
            HandbookError::InvalidUrl(_) => "Pass an absolute URL (e.g., https://example.com/handbook?print=true).",
            HandbookError::Config(_) => {
                "Check flags and the config file (selectors, page size, timeouts)."
            }
            HandbookError::Serialization(_) | HandbookError::Internal(_) => {
                "Re-run with --verbose; file an issue if persistent."
            }
        };
        ErrorPayload::new(self.kind(), self.to_string(), remediation)
    }
}

pub type Result<T> = std::result::Result<T, HandbookError>;

/// Error taxonomy reported to callers; every pipeline failure maps to exactly one kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[serde(rename = "LaunchError")]
    Launch,
    #[serde(rename = "PageLoadError")]
    PageLoad,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "NoSectionsFoundError")]
    NoSectionsFound,
    #[serde(rename = "CaptureError")]
    Capture,
    #[serde(rename = "MergeError")]
    Merge,
    #[serde(rename = "PersistError")]
    Persist,
    #[serde(rename = "InvalidUrlError")]
    InvalidUrl,
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Launch => "LaunchError",
            ErrorKind::PageLoad => "PageLoadError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::NoSectionsFound => "NoSectionsFoundError",
            ErrorKind::Capture => "CaptureError",
            ErrorKind::Merge => "MergeError",
            ErrorKind::Persist => "PersistError",
            ErrorKind::InvalidUrl => "InvalidUrlError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: String, remediation: impl Into<String>) -> Self {
        Self {
            kind,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
