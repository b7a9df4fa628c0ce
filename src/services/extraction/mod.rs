//! Turning free-form answers into field values.

pub mod assisted;
pub mod json_recovery;
pub mod pattern;

pub use assisted::AssistedExtractor;
pub use json_recovery::recover_object;
pub use pattern::PatternExtractor;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::{ExtractedFields, ExtractionMethod, Task};
use crate::domain::ports::{FailureKind, ProviderError};
use crate::services::retry::Retryable;

/// Errors from value extraction.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("extraction model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("extraction reply held no JSON object: {0}")]
    Unparseable(String),
}

impl Retryable for ExtractionError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Provider(err) => err.kind(),
            // The secondary model may format its next reply properly.
            Self::Unparseable(_) => FailureKind::Transient,
        }
    }
}

/// Pulls ground-truth field values out of one raw answer.
#[async_trait]
pub trait ValueExtractor: Send + Sync {
    /// Method reported when nothing more specific applies.
    fn method(&self) -> ExtractionMethod;

    async fn extract(&self, task: &Task, raw_text: &str) -> Result<ExtractedFields, ExtractionError>;
}
