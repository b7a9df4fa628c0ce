//! Evaluation result files: per-model `evaluation.json`, the cross-model
//! `summary.json`, and a Markdown results table.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{read_optional, write_atomic, write_json_atomic};
use crate::domain::errors::DomainResult;
use crate::domain::models::{ModelEvaluation, ModelSummaryRow};

pub const EVALUATION_FILE: &str = "evaluation.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const README_FILE: &str = "README.md";

/// Cross-model summary document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossModelSummary {
    pub updated_at: Option<chrono::DateTime<Utc>>,
    pub models: Vec<ModelSummaryRow>,
}

/// Writes evaluation results under one root directory.
#[derive(Debug, Clone)]
pub struct EvaluationWriter {
    root: PathBuf,
}

impl EvaluationWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `<root>/<slug>/evaluation.json` and return its path.
    pub async fn write_model(&self, slug: &str, evaluation: &ModelEvaluation) -> DomainResult<PathBuf> {
        let path = self.root.join(slug).join(EVALUATION_FILE);
        write_json_atomic(&path, evaluation).await?;
        info!(path = %path.display(), model = %evaluation.model, "evaluation written");
        Ok(path)
    }

    /// Load the cross-model summary, empty if absent or unreadable.
    pub async fn load_summary(&self) -> DomainResult<CrossModelSummary> {
        let path = self.root.join(SUMMARY_FILE);
        let Some(text) = read_optional(&path).await? else {
            return Ok(CrossModelSummary::default());
        };
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable summary");
            CrossModelSummary::default()
        }))
    }

    /// Merge `rows` into the cross-model summary and regenerate the README.
    ///
    /// Rows replace earlier rows for the same model; other models are kept.
    pub async fn update_summary(&self, rows: &[ModelSummaryRow]) -> DomainResult<CrossModelSummary> {
        let mut summary = self.load_summary().await?;
        for row in rows {
            summary.models.retain(|existing| existing.model != row.model);
            summary.models.push(row.clone());
        }
        summary.models.sort_by(|a, b| a.model.cmp(&b.model));
        summary.updated_at = Some(Utc::now());

        write_json_atomic(&self.root.join(SUMMARY_FILE), &summary).await?;
        write_atomic(
            self.root.join(README_FILE),
            render_readme(&summary).into_bytes(),
        )
        .await?;
        Ok(summary)
    }
}

fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Markdown results table, one row per model, best pass rate first.
pub fn render_readme(summary: &CrossModelSummary) -> String {
    let tiers: BTreeSet<&str> = summary
        .models
        .iter()
        .flat_map(|row| row.tier_pass_rates.keys().map(String::as_str))
        .collect();

    let mut rows: Vec<&ModelSummaryRow> = summary.models.iter().collect();
    rows.sort_by(|a, b| {
        b.pass_rate
            .total_cmp(&a.pass_rate)
            .then_with(|| a.model.cmp(&b.model))
    });

    let mut out = String::from("# Evaluation Results\n\n");
    if let Some(updated) = summary.updated_at {
        let _ = writeln!(out, "Last updated: {}\n", updated.to_rfc3339());
    }

    out.push_str("| Model | Provider | Method | Passed | Pass rate |");
    for tier in &tiers {
        let _ = write!(out, " {tier} |");
    }
    out.push_str(" Low confidence |\n|---|---|---|---|---|");
    for _ in &tiers {
        out.push_str("---|");
    }
    out.push_str("---|\n");

    for row in rows {
        let _ = write!(
            out,
            "| {} | {} | {} | {}/{} | {} |",
            row.model_display,
            row.provider,
            row.method,
            row.pass,
            row.total,
            percent(row.pass_rate)
        );
        for tier in &tiers {
            let cell = row
                .tier_pass_rates
                .get(*tier)
                .map_or_else(|| "-".to_string(), |rate| percent(*rate));
            let _ = write!(out, " {cell} |");
        }
        let _ = writeln!(out, " {} |", row.low_confidence);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn row(model: &str, pass: usize, total: usize, tiers: &[(&str, f64)]) -> ModelSummaryRow {
        ModelSummaryRow {
            model: model.to_string(),
            model_display: model.to_uppercase(),
            provider: "openai".to_string(),
            method: "pattern".to_string(),
            total,
            pass,
            pass_rate: pass as f64 / total as f64,
            low_confidence: 0,
            tier_pass_rates: tiers
                .iter()
                .map(|(t, r)| ((*t).to_string(), *r))
                .collect::<BTreeMap<_, _>>(),
            targets_met: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_readme_orders_by_pass_rate() {
        let summary = CrossModelSummary {
            updated_at: None,
            models: vec![
                row("a", 1, 4, &[("tier1", 0.5)]),
                row("b", 3, 4, &[("tier1", 1.0), ("tier2", 0.5)]),
            ],
        };
        let readme = render_readme(&summary);
        let b = readme.find("| B |").unwrap();
        let a = readme.find("| A |").unwrap();
        assert!(b < a);
        assert!(readme.contains("| Model | Provider | Method | Passed | Pass rate | tier1 | tier2 |"));
        assert!(readme.contains("| A | openai | pattern | 1/4 | 25.0% | 50.0% | - | 0 |"));
    }

    #[tokio::test]
    async fn test_update_summary_replaces_same_model() {
        let dir = TempDir::new().unwrap();
        let writer = EvaluationWriter::new(dir.path());

        writer.update_summary(&[row("a", 1, 4, &[]), row("b", 2, 4, &[])]).await.unwrap();
        let summary = writer.update_summary(&[row("a", 4, 4, &[])]).await.unwrap();

        assert_eq!(summary.models.len(), 2);
        assert_eq!(summary.models[0].model, "a");
        assert_eq!(summary.models[0].pass, 4);
        assert!(dir.path().join(README_FILE).exists());

        let reloaded = writer.load_summary().await.unwrap();
        assert_eq!(reloaded.models.len(), 2);
    }
}
