use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::merge::MergedDocument;
use crate::{HandbookError, Result};

pub const FILENAME_PREFIX: &str = "handbook-";
pub const FILENAME_EXTENSION: &str = ".pdf";

/// A persisted PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputArtifact {
    pub filename: String,
    pub filepath: PathBuf,
}

/// Append-only output directory.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `handbook-<uuid-v4>.pdf`, fresh on every call.
    pub fn unique_filename() -> String {
        format!("{FILENAME_PREFIX}{}{FILENAME_EXTENSION}", Uuid::new_v4())
    }

    /// True for names this store could have produced.
    pub fn is_artifact_name(name: &str) -> bool {
        name.strip_prefix(FILENAME_PREFIX)
            .and_then(|rest| rest.strip_suffix(FILENAME_EXTENSION))
            .is_some_and(|id| Uuid::parse_str(id).is_ok())
    }

    /// Write under a `.part` name, then rename into place.
    pub async fn persist(&self, document: &MergedDocument) -> Result<OutputArtifact> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            HandbookError::persist(format!(
                "cannot create output directory {}: {err}",
                self.root.display()
            ))
        })?;

        let filename = Self::unique_filename();
        let filepath = self.root.join(&filename);
        let partial = self.root.join(format!("{filename}.part"));

        if let Err(err) = tokio::fs::write(&partial, &document.bytes).await {
            discard(&partial).await;
            return Err(HandbookError::persist(format!(
                "cannot write {}: {err}",
                partial.display()
            )));
        }
        if let Err(err) = tokio::fs::rename(&partial, &filepath).await {
            discard(&partial).await;
            return Err(HandbookError::persist(format!(
                "cannot move {} into place: {err}",
                filepath.display()
            )));
        }

        debug!(path = %filepath.display(), bytes = document.bytes.len(), "artifact persisted");
        Ok(OutputArtifact { filename, filepath })
    }
}

async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %partial.display(), error = %err, "could not remove partial file"),
    }
}
