use crate::diagnostics::DiagnosticBundle;
use crate::error::ErrorPayload;
use crate::pipeline::GenerationReport;
use crate::Viewport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const HANDBOOK_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum HandbookOutput {
    Generate(GenerateOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutput {
    pub version: String,
    pub source_url: String,
    pub filename: String,
    pub filepath: PathBuf,
    pub pages: usize,
    pub request_id: String,
    pub page_size: Viewport,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticBundle>,
}

impl GenerateOutput {
    pub fn from_report(report: &GenerationReport, source_url: &str, page_size: Viewport) -> Self {
        Self {
            version: HANDBOOK_OUTPUT_VERSION.to_string(),
            source_url: source_url.to_string(),
            filename: report.artifact.filename.clone(),
            filepath: report.artifact.filepath.clone(),
            pages: report.pages,
            request_id: report.request_id.to_string(),
            page_size,
            elapsed_ms: report.elapsed.as_millis() as u64,
            diagnostics: report.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn generate_output_serializes() {
        let output = HandbookOutput::Generate(GenerateOutput {
            version: HANDBOOK_OUTPUT_VERSION.to_string(),
            source_url: "https://example.com/handbook?print=true".to_string(),
            filename: "handbook-0b8f.pdf".to_string(),
            filepath: PathBuf::from("output/handbook-0b8f.pdf"),
            pages: 12,
            request_id: "0b8f".to_string(),
            page_size: Viewport::default(),
            elapsed_ms: 4200,
            diagnostics: None,
        });

        let json = serde_json::to_string(&output).expect("serialize generate output");
        assert!(json.contains("\"mode\":\"generate\""));
        assert!(json.contains("\"pages\":12"));
        assert!(json.contains("\"requestId\":\"0b8f\""));
        assert!(!json.contains("diagnostics"));
    }

    #[test]
    fn error_output_serializes() {
        let output = HandbookOutput::Error(ErrorOutput {
            version: HANDBOOK_OUTPUT_VERSION.to_string(),
            message: Some("no sections".to_string()),
            error: ErrorPayload::new(
                ErrorKind::NoSectionsFound,
                "no sections".to_string(),
                "check selectors",
            ),
        });

        let json = serde_json::to_string(&output).expect("serialize error output");
        assert!(json.contains("\"mode\":\"error\""));
        assert!(json.contains("\"kind\":\"NoSectionsFoundError\""));
    }
}
