//! Anthropic Messages API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::http::{build_client, elapsed_ms, send_json, trim_base_url};
use crate::domain::models::{ProviderAnswer, TokenUsage};
use crate::domain::ports::{AnswerProvider, CompletionClient, CompletionRequest, ProviderError};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Client for `POST /v1/messages`.
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
}

impl AnthropicClient {
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
            system_prompt: None,
            max_tokens: 16_384,
        })
    }

    /// Instruction sent as `system` with every answer request.
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

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse, ProviderError> {
        send_json(
            self.http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(request),
        )
        .await
    }
}

#[async_trait]
impl AnswerProvider for AnthropicClient {
    fn name(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    async fn fetch_answer(&self, question: &str) -> Result<ProviderAnswer, ProviderError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: self.system_prompt.as_deref(),
            messages: vec![Message {
                role: "user",
                content: question,
            }],
            temperature: None,
        };

        let start = Instant::now();
        let response = self.send(&request).await?;
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
            finish_reason: response
                .stop_reason
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            model_used: response.model.clone().unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: Some(0.0),
        };
        Ok(self.send(&body).await?.text())
    }
}
