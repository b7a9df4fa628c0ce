//! Concurrent extraction and evaluation of a harvested answer set.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::evaluator::{evaluate, extraction_failed};
use super::extraction::ValueExtractor;
use super::rubric::{fold_into, RubricJudge};
use crate::domain::models::answer::SESSION_FAILURE_PREFIX;
use crate::domain::models::{EvaluationVerdict, RawAnswer, Task, ToleranceDefaults};
use crate::domain::ports::OutcomeMap;

/// Extracts and evaluates every recorded answer of one model.
///
/// Items run concurrently up to `concurrency`. Secondary-model rate limits
/// live on the clients handed to the extractor and judge. A failing item
/// becomes an `extraction_failed` verdict and never affects its siblings.
pub struct EvaluationPipeline {
    extractor: Arc<dyn ValueExtractor>,
    judge: Option<Arc<RubricJudge>>,
    tolerance: ToleranceDefaults,
    concurrency: usize,
    item_timeout: Option<Duration>,
    min_response_chars: usize,
}

impl EvaluationPipeline {
    pub fn new(extractor: Arc<dyn ValueExtractor>, tolerance: ToleranceDefaults) -> Self {
        Self {
            extractor,
            judge: None,
            tolerance,
            concurrency: 1,
            item_timeout: None,
            min_response_chars: 0,
        }
    }

    #[must_use]
    pub fn with_judge(mut self, judge: Arc<RubricJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Bound each item's extraction and judging.
    #[must_use]
    pub const fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = Some(timeout);
        self
    }

    /// Answers no longer than this are treated as missing.
    #[must_use]
    pub const fn with_min_response_chars(mut self, min: usize) -> Self {
        self.min_response_chars = min;
        self
    }

    /// Evaluate every recorded answer whose task is in `tasks`.
    ///
    /// Verdicts come back sorted by task id. `on_item` is called as each
    /// verdict lands, in completion order.
    pub async fn evaluate_all<F>(
        &self,
        tasks: &[Task],
        outcomes: &OutcomeMap,
        on_item: F,
    ) -> Vec<EvaluationVerdict>
    where
        F: Fn(&EvaluationVerdict),
    {
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut items = Vec::with_capacity(outcomes.len());
        for (task_id, answer) in outcomes {
            match by_id.get(task_id.as_str()) {
                Some(task) => items.push((*task, answer)),
                None => warn!(task_id = %task_id, "recorded answer has no task in the catalog"),
            }
        }

        let on_item = &on_item;
        let mut verdicts: Vec<EvaluationVerdict> = stream::iter(items)
            .map(|(task, answer)| async move {
                let verdict = self.evaluate_item(task, answer).await;
                on_item(&verdict);
                verdict
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        verdicts.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        verdicts
    }

    async fn evaluate_item(&self, task: &Task, answer: &RawAnswer) -> EvaluationVerdict {
        if let Some(error) = &answer.error {
            return extraction_failed(task, format!("no answer recorded: {error}"));
        }
        if answer.response_text.starts_with(SESSION_FAILURE_PREFIX) {
            return extraction_failed(task, "session reported a failure");
        }
        if !answer.is_success(self.min_response_chars)
            || answer.response_text.trim().chars().count() <= self.min_response_chars
        {
            return extraction_failed(task, "empty response");
        }

        let work = self.extract_and_judge(task, &answer.response_text);
        match self.item_timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                warn!(task_id = %task.id, "evaluation timed out");
                extraction_failed(task, format!("evaluation timed out after {limit:?}"))
            }),
            None => work.await,
        }
    }

    async fn extract_and_judge(&self, task: &Task, text: &str) -> EvaluationVerdict {
        let fields = match self.extractor.extract(task, text).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "extraction failed");
                return extraction_failed(task, err.to_string());
            }
        };
        let verdict = evaluate(task, &fields, &self.tolerance);

        let Some(judge) = &self.judge else {
            return verdict;
        };
        match judge.judge(task, text, &verdict).await {
            Ok(score) => fold_into(verdict, score),
            Err(err) => {
                // The numeric verdict stands without a rubric score.
                debug!(task_id = %task.id, error = %err, "rubric judging failed");
                verdict
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FailureReason, ModelSpec, ProviderAnswer, ProviderKind, TokenUsage};
    use crate::services::extraction::PatternExtractor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(id: &str, n: u32) -> Task {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "tier": 1,
            "question": "q",
            "ground_truth": {"sample_size_per_group": n},
        }))
        .unwrap()
    }

    fn answer(task: &Task, text: &str) -> RawAnswer {
        let model = ModelSpec::new("m", ProviderKind::OpenAi, "M");
        RawAnswer::success(
            task,
            &model,
            ProviderAnswer {
                response_text: text.to_string(),
                structured_trace: Vec::new(),
                latency_ms: 1,
                tokens: TokenUsage::new(1, 1),
                finish_reason: "stop".to_string(),
                model_used: "m".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_mixed_outcomes_sorted_by_task() {
        let tasks = vec![task("t1-b", 64), task("t1-a", 30), task("t1-c", 50)];
        let model = ModelSpec::new("m", ProviderKind::OpenAi, "M");
        let mut outcomes = OutcomeMap::new();
        outcomes.insert("t1-b".into(), answer(&tasks[0], "After all that, you need 64 participants per group."));
        outcomes.insert("t1-a".into(), answer(&tasks[1], "After all that, you need 45 participants per group."));
        outcomes.insert("t1-c".into(), RawAnswer::failure(&tasks[2], &model, "Rate limit exceeded"));
        outcomes.insert("t9-orphan".into(), answer(&tasks[0], "irrelevant"));

        let seen = AtomicUsize::new(0);
        let pipeline = EvaluationPipeline::new(
            Arc::new(PatternExtractor::new(false)),
            ToleranceDefaults::default(),
        )
        .with_concurrency(4);
        let verdicts = pipeline
            .evaluate_all(&tasks, &outcomes, |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let ids: Vec<_> = verdicts.iter().map(|v| v.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1-a", "t1-b", "t1-c"]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(verdicts[0].reason, FailureReason::ValueIncorrect);
        assert!(verdicts[1].pass);
        assert_eq!(verdicts[2].reason, FailureReason::ExtractionFailed);
    }

    #[tokio::test]
    async fn test_session_failure_marker_is_extraction_failure() {
        let tasks = vec![task("t1-a", 64)];
        let mut outcomes = OutcomeMap::new();
        outcomes.insert(
            "t1-a".into(),
            answer(&tasks[0], "FAILED: driver exited before answering, expected 64 per group"),
        );

        let pipeline = EvaluationPipeline::new(
            Arc::new(PatternExtractor::new(true)),
            ToleranceDefaults::default(),
        )
        .with_min_response_chars(20);
        let verdicts = pipeline.evaluate_all(&tasks, &outcomes, |_| {}).await;

        assert_eq!(verdicts[0].reason, FailureReason::ExtractionFailed);
        assert_eq!(verdicts[0].detail.as_deref(), Some("session reported a failure"));
        assert!(verdicts[0].extracted.is_empty());
    }
}
