//! Aggregate report model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::verdict::EvaluationVerdict;

/// Histogram of rubric totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBands {
    /// 90 and above
    pub excellent: usize,
    /// 80 to 89
    pub good: usize,
    /// 70 to 79
    pub acceptable: usize,
    /// 50 to 69
    pub poor: usize,
    /// Below 50
    pub failing: usize,
}

impl ScoreBands {
    pub fn record(&mut self, score: f64) {
        if score >= 90.0 {
            self.excellent += 1;
        } else if score >= 80.0 {
            self.good += 1;
        } else if score >= 70.0 {
            self.acceptable += 1;
        } else if score >= 50.0 {
            self.poor += 1;
        } else {
            self.failing += 1;
        }
    }
}

/// Rubric score summary for a group of verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub median: f64,
    pub bands: ScoreBands,
}

/// Counts and rates for one partition (overall, one tier, one category).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    /// Verdicts whose values came from the nearest-number fallback
    pub low_confidence: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreSummary>,
    #[serde(default)]
    pub failure_reasons: BTreeMap<String, usize>,
}

/// A normalized failure message and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrequency {
    pub message: String,
    pub count: usize,
}

/// One target threshold compared against an observed rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    /// `overall`, `tier2`, or `category:<name>`
    pub scope: String,
    pub target: f64,
    pub actual: f64,
}

/// Which target thresholds were met.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetComparison {
    pub met: Vec<TargetResult>,
    pub not_met: Vec<TargetResult>,
}

impl TargetComparison {
    pub fn all_met(&self) -> bool {
        self.not_met.is_empty()
    }
}

/// Roll-up of a verdict list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub overall: GroupStats,
    pub by_tier: BTreeMap<String, GroupStats>,
    pub by_category: BTreeMap<String, GroupStats>,
    /// Mean rubric sub-score per rubric criterion
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub criteria_averages: BTreeMap<String, f64>,
    pub common_errors: Vec<ErrorFrequency>,
    pub targets: TargetComparison,
}

impl AggregateReport {
    pub const fn pass_rate(&self) -> f64 {
        self.overall.pass_rate
    }
}

/// Pass counts for one tier, as written to `evaluation.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub total: usize,
    pub pass: usize,
    pub pass_rate: f64,
}

/// Headline numbers of one model's evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub pass_rate: f64,
    #[serde(default)]
    pub low_confidence: usize,
    pub tier_breakdown: BTreeMap<String, TierBreakdown>,
    pub failure_reasons: BTreeMap<String, usize>,
}

impl EvaluationSummary {
    pub fn from_report(report: &AggregateReport) -> Self {
        Self {
            total: report.overall.total,
            pass: report.overall.passed,
            fail: report.overall.failed,
            pass_rate: report.overall.pass_rate,
            low_confidence: report.overall.low_confidence,
            tier_breakdown: report
                .by_tier
                .iter()
                .map(|(tier, stats)| {
                    (
                        tier.clone(),
                        TierBreakdown {
                            total: stats.total,
                            pass: stats.passed,
                            pass_rate: stats.pass_rate,
                        },
                    )
                })
                .collect(),
            failure_reasons: report.overall.failure_reasons.clone(),
        }
    }
}

/// Everything recorded about one model's evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub run_id: String,
    pub model: String,
    pub model_display: String,
    pub provider: String,
    /// `pattern` or `assisted`
    pub method: String,
    pub timestamp: DateTime<Utc>,
    pub summary: EvaluationSummary,
    pub report: AggregateReport,
    pub detailed_results: BTreeMap<String, EvaluationVerdict>,
}

/// One row of the cross-model `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummaryRow {
    pub model: String,
    pub model_display: String,
    pub provider: String,
    pub method: String,
    pub total: usize,
    pub pass: usize,
    pub pass_rate: f64,
    #[serde(default)]
    pub low_confidence: usize,
    #[serde(default)]
    pub tier_pass_rates: BTreeMap<String, f64>,
    pub targets_met: bool,
    pub timestamp: DateTime<Utc>,
}

impl ModelSummaryRow {
    pub fn from_evaluation(evaluation: &ModelEvaluation) -> Self {
        Self {
            model: evaluation.model.clone(),
            model_display: evaluation.model_display.clone(),
            provider: evaluation.provider.clone(),
            method: evaluation.method.clone(),
            total: evaluation.summary.total,
            pass: evaluation.summary.pass,
            pass_rate: evaluation.summary.pass_rate,
            low_confidence: evaluation.summary.low_confidence,
            tier_pass_rates: evaluation
                .summary
                .tier_breakdown
                .iter()
                .map(|(tier, b)| (tier.clone(), b.pass_rate))
                .collect(),
            targets_met: evaluation.report.targets.all_met(),
            timestamp: evaluation.timestamp,
        }
    }
}
