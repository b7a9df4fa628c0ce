//! Gemini `generateContent` client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::http::{build_client, elapsed_ms, send_json, trim_base_url};
use crate::domain::models::{ProviderAnswer, TokenUsage, TraceRecord};
use crate::domain::ports::{AnswerProvider, CompletionClient, CompletionRequest, ProviderError};

/// Thinking budget that keeps free-tier token-per-minute usage in check.
const THINKING_BUDGET: u32 = 2048;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    executable_code: Option<ExecutableCode>,
    #[serde(default)]
    code_execution_result: Option<CodeExecutionResult>,
}

#[derive(Debug, Deserialize)]
struct ExecutableCode {
    #[serde(default)]
    language: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct CodeExecutionResult {
    #[serde(default)]
    output: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateResponse {
    /// Answer text and the code-execution trace of the first candidate.
    fn text_and_trace(&self) -> (String, Vec<TraceRecord>) {
        let parts = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map_or(&[][..], |c| c.parts.as_slice());

        let mut text = Vec::new();
        let mut trace = Vec::new();
        for part in parts {
            if let Some(code) = &part.executable_code {
                trace.push(TraceRecord::CodeExecution {
                    language: code.language.to_ascii_lowercase(),
                    code: code.code.clone(),
                    output: String::new(),
                });
            }
            if let Some(result) = &part.code_execution_result {
                match trace.last_mut() {
                    Some(TraceRecord::CodeExecution { output, .. }) if output.is_empty() => {
                        output.clone_from(&result.output);
                    }
                    _ => trace.push(TraceRecord::ToolResult {
                        output: result.output.clone(),
                        is_error: false,
                    }),
                }
            }
            if let Some(chunk) = &part.text {
                if !part.thought {
                    text.push(chunk.as_str());
                }
            }
        }
        (text.concat(), trace)
    }
}

/// Gemini answer provider and completion client.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
}

impl GeminiClient {
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
            max_tokens: None,
        })
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<ProviderAnswer, ProviderError> {
        let request = GenerateRequest {
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![TextPart { text }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
                temperature,
                thinking_config: ThinkingConfig {
                    thinking_budget: THINKING_BUDGET,
                },
            },
        };

        let start = Instant::now();
        let response: GenerateResponse = send_json(
            self.http
                .post(format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .query(&[("key", self.api_key.as_str())])
                .json(&request),
        )
        .await?;
        let latency_ms = elapsed_ms(start);

        let (text, trace) = response.text_and_trace();
        let usage = response.usage_metadata.as_ref();
        Ok(ProviderAnswer {
            response_text: text,
            structured_trace: trace,
            latency_ms,
            tokens: TokenUsage::new(
                usage.map_or(0, |u| u.prompt_token_count),
                usage.map_or(0, |u| u.candidates_token_count),
            ),
            finish_reason: response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            model_used: response
                .model_version
                .clone()
                .unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl AnswerProvider for GeminiClient {
    fn name(&self) -> String {
        format!("gemini:{}", self.model)
    }

    async fn fetch_answer(&self, question: &str) -> Result<ProviderAnswer, ProviderError> {
        self.generate(self.system_prompt.as_deref(), question, self.max_tokens, None)
            .await
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let answer = self
            .generate(
                request.system.as_deref(),
                &request.prompt,
                Some(request.max_tokens),
                Some(0.0),
            )
            .await?;
        Ok(answer.response_text)
    }
}
