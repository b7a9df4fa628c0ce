//! `quantbench harvest`: collect answers from one or more models.
//!
//! Each provider family runs as its own tokio task so that a slow family
//! never holds up the others. Models of one family are harvested one after
//! another, which keeps at most one call in flight per provider.

use anyhow::{anyhow, Context, Result};
use comfy_table::{Cell, CellAlignment};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::list;
use crate::cli::output::progress::{ProgressBarExt, RunProgress};
use crate::cli::output::{output, truncate, CommandOutput, TableFormatter};
use crate::cli::types::HarvestArgs;
use crate::domain::models::{Config, ModelSpec, ProviderKind, Task};
use crate::domain::ports::AnswerProvider;
use crate::infrastructure::catalog::TaskLoader;
use crate::infrastructure::providers::ProviderRegistry;
use crate::infrastructure::storage::JsonOutcomeStore;
use crate::services::{HarvestSummary, Harvester, TaskOutcome};

#[derive(Debug, Serialize)]
pub struct ModelHarvestOutput {
    pub model: String,
    pub provider: String,
    pub store: String,
    #[serde(flatten)]
    pub summary: HarvestSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelHarvestOutput {
    fn new(model: &ModelSpec, store: &Path) -> Self {
        Self {
            model: model.id.clone(),
            provider: model.provider.to_string(),
            store: store.display().to_string(),
            summary: HarvestSummary::default(),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HarvestOutput {
    pub run_id: String,
    pub tasks: usize,
    pub models: Vec<ModelHarvestOutput>,
}

impl HarvestOutput {
    fn has_errors(&self) -> bool {
        self.models.iter().any(|m| m.error.is_some())
    }
}

impl CommandOutput for HarvestOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut table = formatter.base_table(&[
            "Model", "Provider", "Completed", "Failed", "Skipped", "Elapsed", "Status",
        ]);
        for model in &self.models {
            let status = model
                .error
                .as_deref()
                .map_or_else(|| Cell::new("ok"), |e| Cell::new(truncate(e, 48)));
            table.add_row(vec![
                Cell::new(&model.model),
                Cell::new(&model.provider),
                Cell::new(model.summary.completed).set_alignment(CellAlignment::Right),
                Cell::new(model.summary.failed).set_alignment(CellAlignment::Right),
                Cell::new(model.summary.skipped).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.1}s", model.summary.elapsed_seconds))
                    .set_alignment(CellAlignment::Right),
                status,
            ]);
        }

        format!(
            "Harvest {} over {} task(s):\n{table}",
            &self.run_id[..8],
            self.tasks
        )
    }
}

struct ModelJob {
    index: usize,
    model: ModelSpec,
    provider: Arc<dyn AnswerProvider>,
    bar: ProgressBar,
}

pub async fn execute(args: HarvestArgs, config: Arc<Config>, json_mode: bool) -> Result<ExitCode> {
    if args.list {
        return list::execute(Default::default(), config, json_mode).await;
    }

    let selector = args
        .targets
        .selector()
        .ok_or_else(|| anyhow!("choose a target with --model, --provider or --all"))?;
    let tasks_path = args
        .tasks
        .unwrap_or_else(|| PathBuf::from(&config.harvest.tasks_path));
    let output_root = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.harvest.output_dir));

    let tasks = TaskLoader::new(&tasks_path)
        .load()
        .await
        .with_context(|| format!("Failed to load tasks from {}", tasks_path.display()))?;
    let tasks = Arc::new(tasks);

    let registry = ProviderRegistry::new(Arc::clone(&config));
    let models = registry.resolve(&selector)?;
    let run_id = Uuid::new_v4().to_string();
    info!(run_id = %run_id, models = models.len(), tasks = tasks.len(), "starting harvest run");

    let progress = RunProgress::new(json_mode);
    let total = u64::try_from(tasks.len()).unwrap_or(u64::MAX);
    let mut results: Vec<(usize, ModelHarvestOutput)> = Vec::new();
    let mut families: BTreeMap<ProviderKind, Vec<ModelJob>> = BTreeMap::new();

    for (index, model) in models.into_iter().enumerate() {
        match registry.answer_provider(&model) {
            Ok(provider) => {
                let bar = progress.add_bar(&model.id, total);
                families.entry(model.provider).or_default().push(ModelJob {
                    index,
                    model,
                    provider,
                    bar,
                });
            }
            Err(e) => {
                warn!(model = %model.id, error = %e, "skipping model");
                let store = JsonOutcomeStore::for_model(&output_root, &model);
                let mut row = ModelHarvestOutput::new(&model, store.path());
                row.error = Some(e.to_string());
                results.push((index, row));
            }
        }
    }

    let mut handles = Vec::with_capacity(families.len());
    for (kind, jobs) in families {
        let span = info_span!("harvest", run_id = %run_id, provider = %kind);
        let family = harvest_family(jobs, Arc::clone(&tasks), output_root.clone(), Arc::clone(&config));
        handles.push(tokio::spawn(family.instrument(span)));
    }
    for handle in handles {
        let rows = handle.await.context("Harvest task panicked")?;
        results.extend(rows);
    }

    results.sort_by_key(|(index, _)| *index);
    let result = HarvestOutput {
        run_id,
        tasks: tasks.len(),
        models: results.into_iter().map(|(_, row)| row).collect(),
    };
    output(&result, json_mode);

    Ok(if result.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Harvest every model of one provider family, one at a time.
async fn harvest_family(
    jobs: Vec<ModelJob>,
    tasks: Arc<Vec<Task>>,
    output_root: PathBuf,
    config: Arc<Config>,
) -> Vec<(usize, ModelHarvestOutput)> {
    let mut rows = Vec::with_capacity(jobs.len());
    for job in jobs {
        let store = Arc::new(JsonOutcomeStore::for_model(&output_root, &job.model));
        let mut row = ModelHarvestOutput::new(&job.model, store.path());
        let harvester = Harvester::new(job.provider, store.clone(), job.model, &config.harvest);

        let bar = &job.bar;
        let outcome = harvester
            .run_with_progress(&tasks, |task, outcome| {
                bar.inc(1);
                if outcome == TaskOutcome::Failed {
                    bar.set_message(format!("failed {}", task.id));
                }
            })
            .await;

        match outcome {
            Ok(summary) => {
                if let Err(e) = store.write_summary(&summary).await {
                    warn!(model = %row.model, error = %e, "failed to write harvest summary");
                }
                bar.finish_success(format!(
                    "{} completed, {} failed, {} skipped",
                    summary.completed, summary.failed, summary.skipped
                ));
                row.summary = summary;
            }
            Err(e) => {
                error!(model = %row.model, error = %e, "harvest aborted");
                bar.finish_error(e.to_string());
                row.error = Some(e.to_string());
            }
        }
        rows.push((job.index, row));
    }
    rows
}
