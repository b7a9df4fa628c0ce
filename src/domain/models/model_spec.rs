//! Harvest targets: which model, behind which provider family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider family an answer provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    /// Scripted interactive session driven through a child process
    Session,
}

impl ProviderKind {
    pub const ALL: [Self; 4] = [Self::OpenAi, Self::Anthropic, Self::Gemini, Self::Session];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "session" => Ok(Self::Session),
            other => Err(format!(
                "unknown provider '{other}', expected one of: openai, anthropic, gemini, session"
            )),
        }
    }
}

/// A single harvest target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model identifier sent to the provider
    pub id: String,
    pub provider: ProviderKind,
    /// Directory name for this model's outcome store
    pub slug: String,
    pub display_name: String,
    /// Reasoning models take the system prompt inline and no temperature
    #[serde(default)]
    pub reasoning: bool,
    /// Inter-task delay override, tighter than the provider default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl ModelSpec {
    pub fn new(id: &str, provider: ProviderKind, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            provider,
            slug: id.to_string(),
            display_name: display_name.to_string(),
            reasoning: false,
            delay_ms: None,
        }
    }

    #[must_use]
    pub const fn reasoning(mut self) -> Self {
        self.reasoning = true;
        self
    }

    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Built-in harvest targets.
pub fn default_catalog() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("gpt-5.2", ProviderKind::OpenAi, "GPT-5.2"),
        ModelSpec::new("gpt-5.2-pro", ProviderKind::OpenAi, "GPT-5.2 Pro").reasoning(),
        ModelSpec::new("claude-opus-4-6", ProviderKind::Anthropic, "Claude Opus 4.6"),
        ModelSpec::new("claude-sonnet-4-6", ProviderKind::Anthropic, "Claude Sonnet 4.6"),
        ModelSpec::new("gemini-2.5-pro", ProviderKind::Gemini, "Gemini 2.5 Pro"),
        ModelSpec::new("gemini-2.5-flash", ProviderKind::Gemini, "Gemini 2.5 Flash"),
        ModelSpec::new("gemini-3.1-pro-preview", ProviderKind::Gemini, "Gemini 3.1 Pro Preview")
            .with_delay_ms(45_000),
    ]
}
