//! Completion client port - a secondary instruction-following model.

use async_trait::async_trait;

use super::answer_provider::ProviderError;

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Model used for assisted extraction and rubric judging.
///
/// Calls are deterministic where the backend allows it (temperature 0).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier, for logs and reports.
    fn model(&self) -> &str;

    /// Run one completion and return the concatenated text output.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}
