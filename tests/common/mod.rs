//! Common test utilities for integration tests
//!
//! Provides shared fixtures, scripted providers and helpers used across
//! multiple integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use quantbench::domain::models::{ProviderAnswer, Task, TokenUsage};
use quantbench::domain::ports::{AnswerProvider, ProviderError, Sleeper};

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A normalized task with one ground-truth field.
pub fn task(id: &str, field: &str, value: f64) -> Task {
    let json = serde_json::json!({
        "id": id,
        "question": format!("Question for {id}"),
        "ground_truth": { field: value },
    });
    serde_json::from_value::<Task>(json)
        .expect("valid task")
        .normalized()
        .expect("task with a gating field")
}

/// Write `tasks` as `<dir>/tier<N>/tasks.json` files.
pub fn write_catalog(dir: &Path, tasks: &[Task]) {
    let mut by_tier: BTreeMap<u8, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        by_tier.entry(task.tier).or_default().push(task);
    }
    for (tier, tasks) in by_tier {
        let tier_dir = dir.join(format!("tier{tier}"));
        std::fs::create_dir_all(&tier_dir).expect("create tier dir");
        let body = serde_json::json!({ "tasks": tasks });
        std::fs::write(tier_dir.join("tasks.json"), body.to_string()).expect("write catalog");
    }
}

/// A provider answer with fixed metadata.
pub fn answer(text: &str) -> ProviderAnswer {
    ProviderAnswer {
        response_text: text.to_string(),
        structured_trace: Vec::new(),
        latency_ms: 12,
        tokens: TokenUsage::new(100, 250),
        finish_reason: "stop".to_string(),
        model_used: "scripted-1".to_string(),
    }
}

/// Provider that replays a script of results and counts its calls.
///
/// Once the script runs out, every call returns `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderAnswer, ProviderError>>>,
    fallback: Result<ProviderAnswer, ProviderError>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(
        script: Vec<Result<ProviderAnswer, ProviderError>>,
        fallback: Result<ProviderAnswer, ProviderError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Always answers with `text`.
    pub fn answering(text: &str) -> Self {
        Self::new(Vec::new(), Ok(answer(text)))
    }

    /// Always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self::new(Vec::new(), Err(error))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerProvider for ScriptedProvider {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch_answer(&self, _question: &str) -> Result<ProviderAnswer, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Provider whose calls never complete.
#[derive(Default)]
pub struct HangingProvider {
    calls: AtomicU32,
}

impl HangingProvider {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerProvider for HangingProvider {
    fn name(&self) -> String {
        "hanging".to_string()
    }

    async fn fetch_answer(&self, _question: &str) -> Result<ProviderAnswer, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Sleeper that returns at once and remembers what it was asked for.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().expect("sleeper lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("sleeper lock").push(duration);
    }
}
