//! Outcome store backed by one JSON document per model.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{read_optional, write_json_atomic};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ModelSpec;
use crate::domain::ports::{OutcomeMap, OutcomeStore};

/// File name of the outcome document inside a model directory.
pub const RESPONSES_FILE: &str = "raw-responses.json";

/// File name of the per-run harvest summary.
pub const SUMMARY_FILE: &str = "summary.json";

/// `<root>/<slug>/raw-responses.json`, rewritten atomically after every task.
#[derive(Debug, Clone)]
pub struct JsonOutcomeStore {
    path: PathBuf,
}

impl JsonOutcomeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `model` under the harvest output root.
    pub fn for_model(root: impl AsRef<Path>, model: &ModelSpec) -> Self {
        Self::new(root.as_ref().join(&model.slug).join(RESPONSES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the document and its summary.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Write the run summary next to the outcome document.
    pub async fn write_summary<T: Serialize>(&self, summary: &T) -> DomainResult<()> {
        write_json_atomic(&self.dir().join(SUMMARY_FILE), summary).await
    }
}

#[async_trait]
impl OutcomeStore for JsonOutcomeStore {
    async fn load(&self) -> DomainResult<OutcomeMap> {
        let Some(text) = read_optional(&self.path).await? else {
            debug!(path = %self.path.display(), "no outcome store yet");
            return Ok(OutcomeMap::new());
        };
        if text.trim().is_empty() {
            return Ok(OutcomeMap::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            DomainError::SerializationError(format!(
                "corrupt outcome store {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn save(&self, outcomes: &OutcomeMap) -> DomainResult<()> {
        write_json_atomic(&self.path, outcomes).await
    }
}
