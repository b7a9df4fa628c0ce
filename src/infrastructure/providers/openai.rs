//! OpenAI client: Chat Completions, or the Responses API for `-pro` models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::http::{build_client, elapsed_ms, send_json, trim_base_url};
use crate::domain::models::{ProviderAnswer, TokenUsage};
use crate::domain::ports::{AnswerProvider, CompletionClient, CompletionRequest, ProviderError};

/// Whether a model is only served through the Responses API.
pub fn uses_responses_api(model: &str) -> bool {
    model.ends_with("-pro") || model.contains("-pro-")
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    input: &'a str,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl ResponsesResponse {
    fn text(&self) -> String {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::Message { content } => Some(content),
                OutputItem::Other => None,
            })
            .flatten()
            .filter_map(|part| match part {
                OutputContent::OutputText { text } => Some(text.as_str()),
                OutputContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `max_output_tokens` when cut off, else the response status.
    fn finish_reason(&self) -> String {
        if let Some(reason) = self.incomplete_details.as_ref().and_then(|d| d.reason.clone()) {
            return reason;
        }
        self.status.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// OpenAI answer provider and completion client.
///
/// Reasoning models take the system prompt inlined into the user turn and
/// no temperature.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    reasoning: bool,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: trim_base_url(base_url),
            api_key: api_key.into(),
            model: model.into(),
            reasoning: false,
            system_prompt: None,
            max_tokens: 16_384,
        })
    }

    #[must_use]
    pub const fn reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn chat_messages(&self, system: Option<&str>, prompt: &str) -> Vec<ChatMessage> {
        match system {
            Some(system) if self.reasoning => vec![ChatMessage {
                role: "user",
                content: format!("{system}\n\n{prompt}"),
            }],
            Some(system) => vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            None => vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        }
    }

    async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderAnswer, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.chat_messages(system, prompt),
            max_completion_tokens: max_tokens,
            temperature: (!self.reasoning).then_some(0.0),
        };

        let start = Instant::now();
        let response: ChatResponse = send_json(
            self.http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;
        let latency_ms = elapsed_ms(start);

        let choice = response.choices.first();
        let usage = response.usage.unwrap_or_default();
        Ok(ProviderAnswer {
            response_text: choice
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default(),
            structured_trace: Vec::new(),
            latency_ms,
            tokens: TokenUsage::new(usage.prompt_tokens, usage.completion_tokens),
            finish_reason: choice
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            model_used: response.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn responses(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderAnswer, ProviderError> {
        let request = ResponsesRequest {
            model: &self.model,
            instructions: system,
            input: prompt,
            max_output_tokens: max_tokens,
        };

        let start = Instant::now();
        let response: ResponsesResponse = send_json(
            self.http
                .post(format!("{}/v1/responses", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;
        let latency_ms = elapsed_ms(start);

        let usage = response.usage.as_ref();
        Ok(ProviderAnswer {
            response_text: response.text(),
            structured_trace: Vec::new(),
            latency_ms,
            tokens: TokenUsage::new(
                usage.map_or(0, |u| u.input_tokens),
                usage.map_or(0, |u| u.output_tokens),
            ),
            finish_reason: response.finish_reason(),
            model_used: response.model.clone().unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn call(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderAnswer, ProviderError> {
        if uses_responses_api(&self.model) {
            self.responses(system, prompt, max_tokens).await
        } else {
            self.chat(system, prompt, max_tokens).await
        }
    }
}

#[async_trait]
impl AnswerProvider for OpenAiClient {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn fetch_answer(&self, question: &str) -> Result<ProviderAnswer, ProviderError> {
        self.call(self.system_prompt.as_deref(), question, self.max_tokens)
            .await
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let answer = self
            .call(request.system.as_deref(), &request.prompt, request.max_tokens)
            .await?;
        Ok(answer.response_text)
    }
}
