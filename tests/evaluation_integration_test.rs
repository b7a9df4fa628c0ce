//! Harvested answers through extraction, evaluation, aggregation and the
//! evaluation writer.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_test::assert_ok;

use common::{answer, setup_test_logging, task, temp_dir};
use quantbench::domain::models::{
    EvaluationSummary, FailureReason, ModelEvaluation, ModelSpec, ModelSummaryRow, ProviderKind,
    RawAnswer, RubricConfig, RubricOverride, TargetThresholds, Task, ToleranceDefaults,
};
use quantbench::domain::ports::{
    CompletionClient, CompletionRequest, OutcomeMap, OutcomeStore, ProviderError,
};
use quantbench::infrastructure::storage::{EvaluationWriter, JsonOutcomeStore};
use quantbench::services::{aggregate, EvaluationPipeline, PatternExtractor, RetryPolicy, RubricJudge};

fn model() -> ModelSpec {
    ModelSpec::new("gpt-5.2", ProviderKind::OpenAi, "GPT-5.2")
}

fn tasks() -> Vec<Task> {
    vec![
        task("t1-ttest-001", "sample_size_per_group", 64.0),
        task("t1-ttest-002", "sample_size_per_group", 64.0),
        task("t2-anova-001", "total_sample_size", 128.0),
        task("t2-surv-001", "events_needed", 222.0),
    ]
}

async fn seeded_store(dir: &std::path::Path, tasks: &[Task]) -> JsonOutcomeStore {
    let model = model();
    let store = JsonOutcomeStore::for_model(dir, &model);
    let mut outcomes = OutcomeMap::new();
    let texts = [
        "Using the standard formula with d = 0.5, you need 64 participants per group.",
        "Using the standard formula with d = 0.5, you need 70 participants per group.",
        "ok",
    ];
    for (task, text) in tasks.iter().zip(texts) {
        outcomes.insert(task.id.clone(), RawAnswer::success(task, &model, answer(text)));
    }
    outcomes.insert(
        tasks[3].id.clone(),
        RawAnswer::failure(&tasks[3], &model, "Server error (500): upstream"),
    );
    assert_ok!(store.save(&outcomes).await);
    store
}

#[tokio::test]
async fn test_pattern_evaluation_end_to_end() {
    setup_test_logging();
    let dir = temp_dir();
    let tasks = tasks();
    let store = seeded_store(&dir.path().join("raw"), &tasks).await;
    let outcomes = store.load().await.unwrap();

    let pipeline = EvaluationPipeline::new(
        Arc::new(PatternExtractor::new(true)),
        ToleranceDefaults::default(),
    )
    .with_concurrency(2)
    .with_min_response_chars(20);
    let verdicts = pipeline.evaluate_all(&tasks, &outcomes, |_| {}).await;

    let ids: Vec<_> = verdicts.iter().map(|v| v.task_id.as_str()).collect();
    assert_eq!(ids, vec!["t1-ttest-001", "t1-ttest-002", "t2-anova-001", "t2-surv-001"]);
    assert!(verdicts[0].pass);
    assert_eq!(verdicts[1].reason, FailureReason::ValueIncorrect);
    assert_eq!(verdicts[2].reason, FailureReason::ExtractionFailed);
    assert_eq!(verdicts[3].reason, FailureReason::ExtractionFailed);

    let report = aggregate(&verdicts, &TargetThresholds::default());
    assert_eq!(report.overall.total, 4);
    assert_eq!(report.overall.passed, 1);
    assert_eq!(report.by_tier["tier1"].passed, 1);
    assert_eq!(report.by_tier["tier2"].total, 2);
    assert!(!report.targets.all_met());

    let model = model();
    let evaluation = ModelEvaluation {
        run_id: "run-1".to_string(),
        model: model.id.clone(),
        model_display: model.display_name.clone(),
        provider: model.provider.to_string(),
        method: "pattern".to_string(),
        timestamp: Utc::now(),
        summary: EvaluationSummary::from_report(&report),
        report: report.clone(),
        detailed_results: verdicts.iter().map(|v| (v.task_id.clone(), v.clone())).collect(),
    };
    let writer = EvaluationWriter::new(dir.path().join("evaluations"));
    let path = writer.write_model(&model.slug, &evaluation).await.unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["summary"]["pass"], 1);
    assert_eq!(written["summary"]["failure_reasons"]["extraction_failed"], 2);
    assert_eq!(written["summary"]["tier_breakdown"]["tier1"]["total"], 2);
    assert_eq!(written["detailed_results"]["t1-ttest-002"]["reason"], "value_incorrect");

    let summary = writer
        .update_summary(&[ModelSummaryRow::from_evaluation(&evaluation)])
        .await
        .unwrap();
    assert_eq!(summary.models.len(), 1);
    let readme = std::fs::read_to_string(writer.root().join("README.md")).unwrap();
    assert!(readme.contains("GPT-5.2"));
    assert!(readme.contains("25.0%"));
}

#[tokio::test]
async fn test_orphan_answers_are_skipped() {
    let dir = temp_dir();
    let tasks = tasks();
    let store = seeded_store(dir.path(), &tasks).await;
    let outcomes = store.load().await.unwrap();

    let pipeline = EvaluationPipeline::new(
        Arc::new(PatternExtractor::default()),
        ToleranceDefaults::default(),
    );
    let verdicts = pipeline.evaluate_all(&tasks[..2], &outcomes, |_| {}).await;
    assert_eq!(verdicts.len(), 2);
}

/// Judge that always returns the same score sheet.
struct FixedJudge {
    reply: String,
}

#[async_trait]
impl CompletionClient for FixedJudge {
    fn model(&self) -> &str {
        "fixed-judge"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
        Ok(self.reply.clone())
    }
}

#[tokio::test]
async fn test_rubric_cannot_rescue_wrong_value() {
    let dir = temp_dir();
    let tasks = tasks();
    let store = seeded_store(dir.path(), &tasks).await;
    let outcomes = store.load().await.unwrap();

    let reply = serde_json::json!({
        "scores": {
            "templateSelection": 20,
            "parameterExtraction": 20,
            "calculationAccuracy": 30,
            "codeQuality": 10,
            "interpretationQuality": 5
        },
        "totalScore": 85,
        "justification": "Clear and well reasoned.",
        "criticalErrors": []
    })
    .to_string();
    let judge = RubricJudge::new(
        Arc::new(FixedJudge { reply }),
        RetryPolicy::linear(1, 0),
        RubricConfig::default(),
        ToleranceDefaults::default(),
    );
    let pipeline = EvaluationPipeline::new(
        Arc::new(PatternExtractor::new(true)),
        ToleranceDefaults::default(),
    )
    .with_judge(Arc::new(judge))
    .with_min_response_chars(20);

    let verdicts = pipeline.evaluate_all(&tasks[..2], &outcomes, |_| {}).await;

    let right = &verdicts[0];
    assert!(right.pass);
    assert!(right.rubric.as_ref().unwrap().passed);

    let wrong = &verdicts[1];
    let score = wrong.rubric.as_ref().unwrap();
    assert!(!wrong.pass);
    assert!(!score.passed);
    assert_eq!(score.total, 55.0);
    assert_eq!(score.applied_override, Some(RubricOverride::Zeroed));
}
