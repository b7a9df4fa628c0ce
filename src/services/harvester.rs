//! Resumable, crash-safe answer collection for one model.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::retry::RetryPolicy;
use crate::domain::errors::DomainResult;
use crate::domain::models::{HarvestConfig, ModelSpec, RawAnswer, Task};
use crate::domain::ports::{AnswerProvider, OutcomeStore, ProviderError, Sleeper};
use crate::infrastructure::logging::SecretScrubber;

/// Which recorded entries count as final and are skipped on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePolicy {
    /// Response text must be longer than this to count as a success
    pub min_response_chars: usize,
    /// Treat recorded failures as final too
    pub accept_terminal_failures: bool,
}

impl ResumePolicy {
    pub const fn from_config(config: &HarvestConfig) -> Self {
        Self {
            min_response_chars: config.min_response_chars,
            accept_terminal_failures: config.accept_terminal_failures,
        }
    }

    pub fn is_final(&self, answer: &RawAnswer) -> bool {
        answer.is_success(self.min_response_chars)
            || (self.accept_terminal_failures && answer.is_failure())
    }
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

/// What happened to one task during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Skipped,
    Completed,
    Failed,
}

/// Counts written to `summary.json` at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_seconds: f64,
}

impl HarvestSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }
}

/// Collects one answer per task from a single provider.
///
/// Calls are strictly sequential with a fixed delay between them. The
/// outcome map is flushed to the store after every task, so a crash loses
/// at most the task in flight, and a rerun skips every final entry.
pub struct Harvester {
    provider: Arc<dyn AnswerProvider>,
    store: Arc<dyn OutcomeStore>,
    model: ModelSpec,
    retry: RetryPolicy,
    delay: Duration,
    timeout: Duration,
    resume: ResumePolicy,
    scrubber: SecretScrubber,
}

impl Harvester {
    /// Harvester with retry, delay, timeout and resume policy from `config`.
    pub fn new(
        provider: Arc<dyn AnswerProvider>,
        store: Arc<dyn OutcomeStore>,
        model: ModelSpec,
        config: &HarvestConfig,
    ) -> Self {
        let delay = Duration::from_millis(config.delay_for(&model));
        Self {
            provider,
            store,
            model,
            retry: RetryPolicy::from_harvest_config(config),
            delay,
            timeout: Duration::from_secs(config.request_timeout_secs),
            resume: ResumePolicy::from_config(config),
            scrubber: SecretScrubber::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the delay source for both backoff and inter-task delays.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = self.retry.with_sleeper(sleeper);
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_resume_policy(mut self, resume: ResumePolicy) -> Self {
        self.resume = resume;
        self
    }

    pub const fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Harvest every task in catalog order.
    pub async fn run(&self, tasks: &[Task]) -> DomainResult<HarvestSummary> {
        self.run_with_progress(tasks, |_, _| {}).await
    }

    /// Like [`Harvester::run`], reporting each task's outcome as it lands.
    ///
    /// # Errors
    /// Only store failures abort the run. Provider failures are recorded
    /// per task.
    #[instrument(skip_all, fields(model = %self.model.id, tasks = tasks.len()))]
    pub async fn run_with_progress<F>(
        &self,
        tasks: &[Task],
        mut on_task: F,
    ) -> DomainResult<HarvestSummary>
    where
        F: FnMut(&Task, TaskOutcome),
    {
        let started = Instant::now();
        let mut outcomes = self.store.load().await?;
        let mut summary = HarvestSummary::default();
        let mut called_before = false;

        info!(
            existing = outcomes.len(),
            delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "starting harvest"
        );

        for (index, task) in tasks.iter().enumerate() {
            if outcomes.get(&task.id).is_some_and(|a| self.resume.is_final(a)) {
                debug!(task_id = %task.id, "already recorded, skipping");
                summary.record(TaskOutcome::Skipped);
                on_task(task, TaskOutcome::Skipped);
                continue;
            }

            if called_before && !self.delay.is_zero() {
                self.retry.sleeper().sleep(self.delay).await;
            }
            called_before = true;

            info!(task_id = %task.id, n = index + 1, of = tasks.len(), "requesting answer");
            let (entry, outcome) = self.harvest_one(task).await;
            outcomes.insert(task.id.clone(), entry);
            self.store.save(&outcomes).await?;

            summary.record(outcome);
            on_task(task, outcome);
        }

        summary.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_seconds = summary.elapsed_seconds,
            "harvest finished"
        );
        Ok(summary)
    }

    async fn harvest_one(&self, task: &Task) -> (RawAnswer, TaskOutcome) {
        let label = format!("{} {}", self.model.id, task.id);
        let result = self
            .retry
            .execute(&label, |attempt| {
                debug!(task_id = %task.id, attempt, "calling provider");
                let call = self.provider.fetch_answer(&task.question);
                let timeout = self.timeout;
                async move {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(timeout)),
                    }
                }
            })
            .await;

        match result {
            Ok(answer) => {
                if answer.is_truncated() {
                    warn!(
                        task_id = %task.id,
                        finish_reason = %answer.finish_reason,
                        "answer truncated at the token limit"
                    );
                }
                let entry = RawAnswer::success(task, &self.model, answer);
                let outcome = if entry.is_success(self.resume.min_response_chars) {
                    info!(
                        task_id = %task.id,
                        chars = entry.response_text.chars().count(),
                        latency_ms = entry.latency_ms,
                        "answer recorded"
                    );
                    TaskOutcome::Completed
                } else {
                    warn!(task_id = %task.id, "answer empty or marked failed, will retry next run");
                    TaskOutcome::Failed
                };
                (entry, outcome)
            }
            Err(exhausted) => {
                let message = self.scrubber.scrub(&exhausted.last_error.to_string());
                warn!(
                    task_id = %task.id,
                    attempts = exhausted.attempts,
                    error = %message,
                    "recording terminal failure"
                );
                (RawAnswer::failure(task, &self.model, &message), TaskOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ProviderAnswer, ProviderKind, TokenUsage};
    use crate::domain::ports::OutcomeMap;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        outcomes: Mutex<OutcomeMap>,
        saves: AtomicU32,
    }

    #[async_trait]
    impl OutcomeStore for MemoryStore {
        async fn load(&self) -> DomainResult<OutcomeMap> {
            Ok(self.outcomes.lock().unwrap().clone())
        }

        async fn save(&self, outcomes: &OutcomeMap) -> DomainResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.outcomes.lock().unwrap() = outcomes.clone();
            Ok(())
        }
    }

    struct FixedProvider {
        text: String,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AnswerProvider for FixedProvider {
        fn name(&self) -> String {
            "fixed".to_string()
        }

        async fn fetch_answer(&self, _question: &str) -> Result<ProviderAnswer, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderAnswer {
                response_text: self.text.clone(),
                structured_trace: Vec::new(),
                latency_ms: 5,
                tokens: TokenUsage::new(10, 20),
                finish_reason: "stop".to_string(),
                model_used: "fixed-1".to_string(),
            })
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn tasks() -> Vec<Task> {
        (1..=3)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "id": format!("t1-ttest-00{i}"),
                    "tier": 1,
                    "question": format!("Question {i}"),
                    "ground_truth": {"sample_size": 64},
                }))
                .unwrap()
            })
            .collect()
    }

    fn harvester(provider: Arc<FixedProvider>, store: Arc<MemoryStore>) -> Harvester {
        let model = ModelSpec::new("fixed", ProviderKind::Anthropic, "Fixed");
        Harvester::new(provider, store, model, &HarvestConfig::default())
            .with_sleeper(Arc::new(NoSleep))
            .with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_flushes_after_every_task() {
        let provider = Arc::new(FixedProvider {
            text: "You need 64 participants per group.".to_string(),
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(MemoryStore::default());

        let summary = harvester(provider.clone(), store.clone()).run(&tasks()).await.unwrap();

        assert_eq!(summary.completed, 3);
        assert_eq!(store.saves.load(Ordering::SeqCst), 3);
        assert_eq!(store.outcomes.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_short_answer_not_final() {
        let provider = Arc::new(FixedProvider {
            text: "64".to_string(),
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(MemoryStore::default());
        let h = harvester(provider.clone(), store.clone());

        let first = h.run(&tasks()).await.unwrap();
        assert_eq!(first.failed, 3);

        let second = h.run(&tasks()).await.unwrap();
        assert_eq!(second.skipped, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_resume_policy_accepts_failures_when_configured() {
        let task = &tasks()[0];
        let model = ModelSpec::new("fixed", ProviderKind::Anthropic, "Fixed");
        let failure = RawAnswer::failure(task, &model, "boom");

        assert!(!ResumePolicy::default().is_final(&failure));
        let lenient = ResumePolicy {
            accept_terminal_failures: true,
            ..ResumePolicy::default()
        };
        assert!(lenient.is_final(&failure));
    }
}
