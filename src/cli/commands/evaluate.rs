//! `quantbench evaluate`: extract values from harvested answers and score
//! them against ground truth within tolerance.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use governor::DefaultDirectRateLimiter;
use uuid::Uuid;

use crate::cli::output::progress::{ProgressBarExt, RunProgress};
use crate::cli::output::{output, percent, CommandOutput, TableFormatter};
use crate::cli::types::{EvaluateArgs, MethodArg};
use crate::domain::models::report::TargetComparison;
use crate::domain::models::{
    AggregateReport, Config, EvaluationSummary, ExtractionMode, ModelEvaluation, ModelSummaryRow,
    TargetThresholds,
};
use crate::domain::ports::OutcomeStore;
use crate::infrastructure::catalog::TaskLoader;
use crate::infrastructure::providers::{shared_limiter, ProviderRegistry, RateLimitedClient};
use crate::infrastructure::storage::{EvaluationWriter, JsonOutcomeStore};
use crate::services::{
    aggregate, AssistedExtractor, EvaluationPipeline, PatternExtractor, RetryPolicy, RubricJudge,
    ValueExtractor,
};

#[derive(Debug, Serialize)]
pub struct ModelEvaluationOutput {
    pub model: String,
    pub model_display: String,
    pub path: String,
    pub summary: EvaluationSummary,
    pub targets: TargetComparison,
    #[serde(skip)]
    pub report: AggregateReport,
}

#[derive(Debug, Serialize)]
pub struct EvaluateOutput {
    pub run_id: String,
    pub method: String,
    pub rubric: bool,
    pub output_dir: String,
    pub models: Vec<ModelEvaluationOutput>,
    pub overall_pass_rate: f64,
    pub pass_threshold: f64,
    pub threshold_met: bool,
    #[serde(skip)]
    pub thresholds: TargetThresholds,
}

impl CommandOutput for EvaluateOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut out = String::new();

        for model in &self.models {
            let _ = writeln!(out, "{} ({})", model.model_display, model.model);
            let _ = writeln!(out, "{}", formatter.format_report(&model.report, &self.thresholds));
            if !model.summary.failure_reasons.is_empty() {
                let _ = writeln!(
                    out,
                    "{}",
                    formatter.format_failure_reasons(&model.summary.failure_reasons)
                );
            }
            if !model.report.common_errors.is_empty() {
                let _ = writeln!(
                    out,
                    "{}",
                    formatter.format_common_errors(&model.report.common_errors)
                );
            }
            let _ = writeln!(out, "Written to {}\n", model.path);
        }

        let _ = write!(
            out,
            "Overall pass rate {} ({} extraction, threshold {}): {}",
            percent(self.overall_pass_rate),
            self.method,
            percent(self.pass_threshold),
            if self.threshold_met { "PASS" } else { "FAIL" }
        );
        out
    }
}

/// Pick the extraction strategy.
///
/// An explicit `--method assisted` requires a configured extraction model.
/// When assisted mode only comes from config, a missing model falls back to
/// pattern extraction with a warning.
fn build_extractor(
    registry: &ProviderRegistry,
    config: &Config,
    requested: Option<MethodArg>,
    limiter: Option<&Arc<DefaultDirectRateLimiter>>,
) -> Result<(Arc<dyn ValueExtractor>, ExtractionMode)> {
    let extraction = &config.extraction;
    let mode = requested.map_or(extraction.mode, ExtractionMode::from);

    if mode == ExtractionMode::Assisted {
        match registry.completion_client(extraction.provider, &extraction.model) {
            Ok(client) => {
                let client = RateLimitedClient::wrap(client, limiter);
                let extractor = AssistedExtractor::from_config(client, extraction);
                return Ok((Arc::new(extractor), ExtractionMode::Assisted));
            }
            Err(e) if requested.is_none() => {
                warn!(error = %e, "extraction model unavailable, using pattern extraction");
            }
            Err(e) => return Err(e).context("--method assisted needs a configured extraction model"),
        }
    }

    let extractor = PatternExtractor::new(extraction.allow_nearest_fallback);
    Ok((Arc::new(extractor), ExtractionMode::Pattern))
}

fn build_judge(
    registry: &ProviderRegistry,
    config: &Config,
    limiter: Option<&Arc<DefaultDirectRateLimiter>>,
) -> Result<Arc<RubricJudge>> {
    let client = registry
        .completion_client(config.extraction.provider, &config.rubric.judge_model)
        .context("--rubric needs a configured judge model")?;
    let client = RateLimitedClient::wrap(client, limiter);
    let retry = RetryPolicy::linear(
        config.extraction.max_attempts,
        config.extraction.retry_delay_ms,
    );
    Ok(Arc::new(RubricJudge::new(
        client,
        retry,
        config.rubric.clone(),
        config.tolerance.clone(),
    )))
}

/// Upper bound on one item, covering every extraction and judge attempt.
fn item_budget(config: &Config, judged: bool) -> Duration {
    let calls = u64::from(config.extraction.max_attempts.max(1)) * if judged { 2 } else { 1 };
    let per_call = config.extraction.timeout_secs + config.extraction.retry_delay_ms / 1000;
    Duration::from_secs(per_call.saturating_mul(calls))
}

pub async fn execute(args: EvaluateArgs, config: Arc<Config>, json_mode: bool) -> Result<ExitCode> {
    let selector = args
        .targets
        .selector()
        .ok_or_else(|| anyhow!("choose a target with --model, --provider or --all"))?;
    let tasks_path = args
        .tasks
        .unwrap_or_else(|| PathBuf::from(&config.harvest.tasks_path));
    let raw_root = args
        .raw_dir
        .unwrap_or_else(|| PathBuf::from(&config.harvest.output_dir));
    let writer = EvaluationWriter::new(
        args.output
            .unwrap_or_else(|| PathBuf::from(&config.evaluation.output_dir)),
    );

    let tasks = TaskLoader::new(&tasks_path)
        .load()
        .await
        .with_context(|| format!("Failed to load tasks from {}", tasks_path.display()))?;

    let registry = ProviderRegistry::new(Arc::clone(&config));
    let models = registry.resolve(&selector)?;
    // One limiter for every secondary-model call of the run, retries included.
    let limiter = shared_limiter(config.extraction.requests_per_second);
    let (extractor, method) = build_extractor(&registry, &config, args.method, limiter.as_ref())?;
    let judge = if args.rubric {
        Some(build_judge(&registry, &config, limiter.as_ref())?)
    } else {
        None
    };

    let run_id = Uuid::new_v4().to_string();
    info!(
        run_id = %run_id,
        models = models.len(),
        method = method.as_str(),
        rubric = judge.is_some(),
        "starting evaluation run"
    );

    let progress = RunProgress::new(json_mode);
    let mut results = Vec::new();
    let mut rows = Vec::new();
    let mut all_verdicts = Vec::new();

    for model in &models {
        let store = JsonOutcomeStore::for_model(&raw_root, model);
        let outcomes = store
            .load()
            .await
            .with_context(|| format!("Failed to read {}", store.path().display()))?;
        if outcomes.is_empty() {
            warn!(model = %model.id, path = %store.path().display(), "no harvested answers, skipping");
            continue;
        }

        let mut pipeline = EvaluationPipeline::new(Arc::clone(&extractor), config.tolerance.clone())
            .with_concurrency(config.extraction.concurrency)
            .with_min_response_chars(config.harvest.min_response_chars)
            .with_item_timeout(item_budget(&config, judge.is_some()));
        if let Some(judge) = &judge {
            pipeline = pipeline.with_judge(Arc::clone(judge));
        }

        let bar = progress.add_bar(&model.id, u64::try_from(outcomes.len()).unwrap_or(u64::MAX));
        let verdicts = pipeline.evaluate_all(&tasks, &outcomes, |_| bar.inc(1)).await;
        let report = aggregate(&verdicts, &config.targets);
        bar.finish_success(format!(
            "{}/{} passed",
            report.overall.passed, report.overall.total
        ));

        let evaluation = ModelEvaluation {
            run_id: run_id.clone(),
            model: model.id.clone(),
            model_display: model.display_name.clone(),
            provider: model.provider.to_string(),
            method: method.as_str().to_string(),
            timestamp: Utc::now(),
            summary: EvaluationSummary::from_report(&report),
            report: report.clone(),
            detailed_results: verdicts
                .iter()
                .map(|v| (v.task_id.clone(), v.clone()))
                .collect(),
        };
        let path = writer
            .write_model(&model.slug, &evaluation)
            .await
            .with_context(|| format!("Failed to write evaluation for {}", model.id))?;
        info!(model = %model.id, pass_rate = report.pass_rate(), path = %path.display(), "evaluation written");

        rows.push(ModelSummaryRow::from_evaluation(&evaluation));
        results.push(ModelEvaluationOutput {
            model: model.id.clone(),
            model_display: model.display_name.clone(),
            path: path.display().to_string(),
            summary: evaluation.summary,
            targets: report.targets.clone(),
            report,
        });
        all_verdicts.extend(verdicts);
    }

    if results.is_empty() {
        bail!("no harvested answers found under {}", raw_root.display());
    }
    writer
        .update_summary(&rows)
        .await
        .context("Failed to update the cross-model summary")?;

    let overall = aggregate(&all_verdicts, &config.targets).pass_rate();
    let pass_threshold = config.evaluation.pass_threshold;
    let result = EvaluateOutput {
        run_id,
        method: method.as_str().to_string(),
        rubric: judge.is_some(),
        output_dir: writer.root().display().to_string(),
        models: results,
        overall_pass_rate: overall,
        pass_threshold,
        threshold_met: overall >= pass_threshold,
        thresholds: config.targets.clone(),
    };
    output(&result, json_mode);

    Ok(if result.threshold_met {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
