//! Interactive-session provider.
//!
//! Launches a driver executable per question, writes the question on stdin,
//! and reads newline-delimited JSON events from stdout:
//!
//! ```text
//! {"type":"text","content":"..."}
//! {"type":"tool_use","name":"python","input":{...}}
//! {"type":"tool_result","output":"...","is_error":false}
//! {"type":"usage","input":120,"output":480}
//! {"type":"result","text":"final answer","finish_reason":"end_turn"}
//! {"type":"error","message":"..."}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::http::elapsed_ms;
use crate::domain::models::{ProviderAnswer, TokenUsage, TraceRecord};
use crate::domain::ports::{AnswerProvider, ProviderError};

const STDERR_TAIL_CHARS: usize = 400;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SessionEvent {
    Text {
        content: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    Usage {
        #[serde(default)]
        input: u64,
        #[serde(default)]
        output: u64,
    },
    Result {
        text: String,
        #[serde(default)]
        finish_reason: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Default)]
struct SessionTranscript {
    trace: Vec<TraceRecord>,
    tokens: TokenUsage,
    result: Option<(String, Option<String>, Option<String>)>,
    error: Option<String>,
}

impl SessionTranscript {
    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Text { content } => self.trace.push(TraceRecord::Text { content }),
            SessionEvent::ToolUse { name, input } => {
                self.trace.push(TraceRecord::ToolUse { name, input });
            }
            SessionEvent::ToolResult { output, is_error } => {
                self.trace.push(TraceRecord::ToolResult { output, is_error });
            }
            SessionEvent::Usage { input, output } => self.tokens = TokenUsage::new(input, output),
            SessionEvent::Result {
                text,
                finish_reason,
                model,
            } => self.result = Some((text, finish_reason, model)),
            SessionEvent::Error { message } => self.error = Some(message),
        }
    }
}

/// Drives one scripted session per question through a child process.
///
/// The child is killed when the call is dropped, so an expired harvest
/// timeout never leaves a session running.
pub struct SessionProvider {
    command: String,
    args: Vec<String>,
    model: String,
}

impl SessionProvider {
    /// `command args... --model <model>` is spawned for every question.
    pub fn new(command: impl Into<String>, args: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args,
            model: model.into(),
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("--model")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn tail(text: &str, max: usize) -> &str {
    let start = text
        .char_indices()
        .rev()
        .nth(max.saturating_sub(1))
        .map_or(0, |(idx, _)| idx);
    text[start..].trim()
}

#[async_trait]
impl AnswerProvider for SessionProvider {
    fn name(&self) -> String {
        format!("session:{}", self.model)
    }

    async fn fetch_answer(&self, question: &str) -> Result<ProviderAnswer, ProviderError> {
        let start = Instant::now();
        let mut child = self.build_command().spawn().map_err(|e| {
            ProviderError::Session(format!("failed to spawn {}: {e}", self.command))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Session("failed to get stdin handle".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Session("failed to get stdout handle".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProviderError::Session("failed to get stderr handle".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        stdin
            .write_all(question.as_bytes())
            .await
            .map_err(|e| ProviderError::Session(format!("failed to write question: {e}")))?;
        drop(stdin);

        let mut transcript = SessionTranscript::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ProviderError::Session(format!("failed to read session output: {e}")))?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SessionEvent>(line) {
                Ok(event) => transcript.apply(event),
                Err(e) => debug!(error = %e, "ignoring non-event session output"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ProviderError::Session(format!("failed to wait for session: {e}")))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if let Some(message) = transcript.error {
            return Err(ProviderError::Session(message));
        }
        let Some((text, finish_reason, model)) = transcript.result else {
            if status.success() {
                return Err(ProviderError::MalformedResponse(
                    "session ended without a result event".to_string(),
                ));
            }
            warn!(status = %status, "session driver exited with failure");
            return Err(ProviderError::Session(format!(
                "driver exited with {status}: {}",
                tail(&stderr_text, STDERR_TAIL_CHARS)
            )));
        };

        Ok(ProviderAnswer {
            response_text: text,
            structured_trace: transcript.trace,
            latency_ms: elapsed_ms(start),
            tokens: transcript.tokens,
            finish_reason: finish_reason.unwrap_or_else(|| "end_turn".to_string()),
            model_used: model.unwrap_or_else(|| self.model.clone()),
        })
    }
}
