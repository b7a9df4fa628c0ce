//! Raw answers collected from answer providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model_spec::ModelSpec;
use super::task::Task;

/// Prefix written by scripted sessions when a run gave up on a task.
pub const SESSION_FAILURE_PREFIX: &str = "FAILED:";

/// Maximum persisted length of an error message.
pub const MAX_ERROR_CHARS: usize = 500;

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub total: u64,
}

impl TokenUsage {
    /// Build usage from input and output counts, deriving the total.
    pub const fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// One entry in a provider's execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Intermediate assistant text
    Text { content: String },
    /// A tool invocation
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// The result of a tool invocation
    ToolResult {
        #[serde(default)]
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Code the provider executed on its side
    CodeExecution {
        #[serde(default)]
        language: String,
        code: String,
        #[serde(default)]
        output: String,
    },
}

/// What a provider returns for a single question.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAnswer {
    pub response_text: String,
    pub structured_trace: Vec<TraceRecord>,
    pub latency_ms: u64,
    pub tokens: TokenUsage,
    pub finish_reason: String,
    pub model_used: String,
}

impl ProviderAnswer {
    /// Whether the provider stopped because it hit its output limit.
    pub fn is_truncated(&self) -> bool {
        matches!(
            self.finish_reason.to_ascii_lowercase().as_str(),
            "length" | "max_tokens" | "max_output_tokens"
        )
    }
}

/// The persisted outcome of harvesting one task from one model.
///
/// Either a success (non-empty `response_text`, no `error`) or a terminal
/// failure carrying a truncated `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnswer {
    pub task_id: String,
    #[serde(default)]
    pub tier: u8,
    #[serde(default)]
    pub question: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_display: Option<String>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structured_trace: Vec<TraceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawAnswer {
    /// Record a successful provider answer.
    pub fn success(task: &Task, model: &ModelSpec, answer: ProviderAnswer) -> Self {
        Self {
            task_id: task.id.clone(),
            tier: task.tier,
            question: task.question.clone(),
            model: model.id.clone(),
            model_display: Some(model.display_name.clone()),
            provider: model.provider.to_string(),
            response_text: answer.response_text,
            structured_trace: answer.structured_trace,
            latency_ms: Some(answer.latency_ms),
            tokens: Some(answer.tokens),
            finish_reason: Some(answer.finish_reason),
            model_used: Some(answer.model_used),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Record a terminal failure. The message is cut to [`MAX_ERROR_CHARS`].
    pub fn failure(task: &Task, model: &ModelSpec, error: &str) -> Self {
        Self {
            task_id: task.id.clone(),
            tier: task.tier,
            question: task.question.clone(),
            model: model.id.clone(),
            model_display: Some(model.display_name.clone()),
            provider: model.provider.to_string(),
            response_text: String::new(),
            structured_trace: Vec::new(),
            latency_ms: None,
            tokens: None,
            finish_reason: None,
            model_used: None,
            timestamp: Utc::now(),
            error: Some(truncate_chars(error, MAX_ERROR_CHARS)),
        }
    }

    /// Whether this entry is a recognized success.
    ///
    /// The text must be longer than `min_chars` and must not carry the
    /// scripted-session failure marker.
    pub fn is_success(&self, min_chars: usize) -> bool {
        self.error.is_none()
            && self.response_text.chars().count() > min_chars
            && !self.response_text.starts_with(SESSION_FAILURE_PREFIX)
    }

    /// Whether this entry records a failure.
    pub const fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Cut a string to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
