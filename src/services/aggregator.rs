//! Roll-up of evaluation verdicts into tier and category statistics.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::domain::models::report::{ErrorFrequency, ScoreSummary, TargetResult};
use crate::domain::models::{
    AggregateReport, EvaluationVerdict, GroupStats, ScoreBands, TargetComparison,
    TargetThresholds,
};

/// Label used for verdicts without a category.
pub const UNCATEGORIZED: &str = "uncategorized";

const MAX_ERROR_LEN: usize = 100;
const MAX_COMMON_ERRORS: usize = 10;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid digit regex"));
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"][^'"]+['"]"#).expect("valid quote regex"));

/// Normalize a failure message so that messages differing only in numbers
/// or quoted names group together.
pub fn normalize_error(message: &str) -> String {
    let message = DIGITS.replace_all(message, "N");
    let message = QUOTED.replace_all(&message, "\"...\"");
    let normalized = message.to_lowercase().trim().to_string();
    if normalized.chars().count() > MAX_ERROR_LEN {
        let mut cut: String = normalized.chars().take(MAX_ERROR_LEN).collect();
        cut.push_str("...");
        cut
    } else {
        normalized
    }
}

#[derive(Default)]
struct GroupAccumulator {
    total: usize,
    passed: usize,
    low_confidence: usize,
    scores: Vec<f64>,
    failure_reasons: BTreeMap<String, usize>,
}

impl GroupAccumulator {
    fn add(&mut self, verdict: &EvaluationVerdict) {
        self.total += 1;
        if verdict.pass {
            self.passed += 1;
        } else {
            *self
                .failure_reasons
                .entry(verdict.reason.as_str().to_string())
                .or_default() += 1;
        }
        if verdict.is_low_confidence() {
            self.low_confidence += 1;
        }
        if let Some(rubric) = &verdict.rubric {
            self.scores.push(rubric.total);
        }
    }

    fn finish(mut self) -> GroupStats {
        let score = if self.scores.is_empty() {
            None
        } else {
            self.scores.sort_by(f64::total_cmp);
            let mut bands = ScoreBands::default();
            for score in &self.scores {
                bands.record(*score);
            }
            Some(ScoreSummary {
                mean: self.scores.iter().sum::<f64>() / self.scores.len() as f64,
                median: median(&self.scores),
                bands,
            })
        };

        GroupStats {
            total: self.total,
            passed: self.passed,
            failed: self.total - self.passed,
            pass_rate: if self.total == 0 {
                0.0
            } else {
                self.passed as f64 / self.total as f64
            },
            low_confidence: self.low_confidence,
            score,
            failure_reasons: self.failure_reasons,
        }
    }
}

/// Median of an already sorted, non-empty slice.
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Aggregate a verdict list and compare it against `targets`.
///
/// Pure: the same verdicts always produce the same report.
pub fn aggregate(verdicts: &[EvaluationVerdict], targets: &TargetThresholds) -> AggregateReport {
    let mut overall = GroupAccumulator::default();
    let mut by_tier: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    let mut by_category: BTreeMap<String, GroupAccumulator> = BTreeMap::new();
    let mut criteria: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut errors: HashMap<String, usize> = HashMap::new();

    for verdict in verdicts {
        overall.add(verdict);
        by_tier
            .entry(format!("tier{}", verdict.tier))
            .or_default()
            .add(verdict);
        by_category
            .entry(verdict.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()))
            .or_default()
            .add(verdict);

        if let Some(rubric) = &verdict.rubric {
            for (name, value) in rubric.scores.criteria() {
                let slot = criteria.entry(name.to_string()).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
            for message in &rubric.critical_errors {
                *errors.entry(normalize_error(message)).or_default() += 1;
            }
        }
        if !verdict.pass {
            for message in verdict.failure_summaries() {
                *errors.entry(normalize_error(&message)).or_default() += 1;
            }
        }
    }

    let overall = overall.finish();
    let by_tier: BTreeMap<_, _> = by_tier.into_iter().map(|(k, v)| (k, v.finish())).collect();
    let by_category: BTreeMap<_, _> = by_category
        .into_iter()
        .map(|(k, v)| (k, v.finish()))
        .collect();

    let mut common_errors: Vec<ErrorFrequency> = errors
        .into_iter()
        .map(|(message, count)| ErrorFrequency { message, count })
        .collect();
    common_errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    common_errors.truncate(MAX_COMMON_ERRORS);

    let targets = compare_targets(&overall, &by_tier, &by_category, targets);

    AggregateReport {
        overall,
        by_tier,
        by_category,
        criteria_averages: criteria
            .into_iter()
            .map(|(name, (sum, n))| (name, sum / n as f64))
            .collect(),
        common_errors,
        targets,
    }
}

fn compare_targets(
    overall: &GroupStats,
    by_tier: &BTreeMap<String, GroupStats>,
    by_category: &BTreeMap<String, GroupStats>,
    targets: &TargetThresholds,
) -> TargetComparison {
    let mut comparison = TargetComparison::default();
    let mut check = |scope: String, target: f64, actual: f64| {
        let result = TargetResult {
            scope,
            target,
            actual,
        };
        if actual >= target {
            comparison.met.push(result);
        } else {
            comparison.not_met.push(result);
        }
    };

    if overall.total > 0 {
        check("overall".to_string(), targets.overall, overall.pass_rate);
    }
    for (tier, target) in &targets.by_tier {
        if let Some(stats) = by_tier.get(tier) {
            check(tier.clone(), *target, stats.pass_rate);
        }
    }
    for (category, target) in &targets.by_category {
        if let Some(stats) = by_category.get(category) {
            check(format!("category:{category}"), *target, stats.pass_rate);
        }
    }
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        ExtractionMethod, FailureReason, FieldFailure, FieldFailureReason, RubricBreakdown,
        RubricScore,
    };

    fn verdict(id: &str, tier: u8, category: &str, pass: bool) -> EvaluationVerdict {
        EvaluationVerdict {
            task_id: id.to_string(),
            tier,
            category: Some(category.to_string()),
            pass,
            reason: if pass {
                FailureReason::AllValuesMatch
            } else {
                FailureReason::ValueIncorrect
            },
            extracted: BTreeMap::new(),
            method: Some(ExtractionMethod::Pattern),
            checks: Vec::new(),
            failures: if pass {
                Vec::new()
            } else {
                vec![FieldFailure {
                    field: "sample_size".to_string(),
                    expected: 64.0,
                    extracted: Some(80.0),
                    tolerance: 5.0,
                    diff: Some(16.0),
                    reason: FieldFailureReason::ValueIncorrect,
                }]
            },
            metadata_checks: Vec::new(),
            rubric: None,
            detail: None,
        }
    }

    fn with_rubric(mut v: EvaluationVerdict, total: f64) -> EvaluationVerdict {
        v.rubric = Some(RubricScore {
            scores: RubricBreakdown {
                calculation_accuracy: 30.0,
                ..Default::default()
            },
            total,
            passed: total >= 70.0,
            justification: String::new(),
            critical_errors: vec![format!("Used '{}' test with n={}", "welch", total)],
            applied_override: None,
        });
        v
    }

    #[test]
    fn test_normalize_error() {
        assert_eq!(
            normalize_error("Used 'pwr.t.test' with N=64 Per Group"),
            "used \"...\" with n=n per group"
        );
        let long = "x".repeat(150);
        assert_eq!(normalize_error(&long).chars().count(), 103);
    }

    #[test]
    fn test_counts_by_tier_and_category() {
        let verdicts = vec![
            verdict("a", 1, "ttest", true),
            verdict("b", 1, "ttest", false),
            verdict("c", 2, "anova", true),
        ];
        let report = aggregate(&verdicts, &TargetThresholds::default());

        assert_eq!(report.overall.total, 3);
        assert_eq!(report.overall.passed, 2);
        assert!((report.pass_rate() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.by_tier["tier1"].pass_rate, 0.5);
        assert_eq!(report.by_category["anova"].passed, 1);
        assert_eq!(report.overall.failure_reasons["value_incorrect"], 1);
        assert_eq!(report.common_errors[0].message, "sample_size: n vs n (off by n.n, tol=n)");
    }

    #[test]
    fn test_targets_compared() {
        let verdicts = vec![verdict("a", 1, "ttest", true), verdict("b", 2, "anova", false)];
        let mut targets = TargetThresholds::default();
        targets.by_category.insert("ttest".to_string(), 0.9);
        let report = aggregate(&verdicts, &targets);

        let met: Vec<_> = report.targets.met.iter().map(|t| t.scope.as_str()).collect();
        let not_met: Vec<_> = report.targets.not_met.iter().map(|t| t.scope.as_str()).collect();
        assert_eq!(met, vec!["tier1", "category:ttest"]);
        assert_eq!(not_met, vec!["overall", "tier2"]);
        assert!(!report.targets.all_met());
    }

    #[test]
    fn test_score_summary_and_bands() {
        let verdicts = vec![
            with_rubric(verdict("a", 1, "ttest", true), 95.0),
            with_rubric(verdict("b", 1, "ttest", true), 72.0),
            with_rubric(verdict("c", 1, "ttest", false), 40.0),
            with_rubric(verdict("d", 1, "ttest", true), 85.0),
        ];
        let report = aggregate(&verdicts, &TargetThresholds::default());
        let score = report.overall.score.unwrap();

        assert_eq!(score.mean, 73.0);
        assert_eq!(score.median, 78.5);
        assert_eq!(score.bands.excellent, 1);
        assert_eq!(score.bands.good, 1);
        assert_eq!(score.bands.acceptable, 1);
        assert_eq!(score.bands.failing, 1);
        assert_eq!(report.criteria_averages["calculation_accuracy"], 30.0);
    }

    #[test]
    fn test_low_confidence_counted() {
        let mut v = verdict("a", 1, "ttest", true);
        v.method = Some(ExtractionMethod::NearestFallback);
        let report = aggregate(&[v, verdict("b", 1, "ttest", true)], &TargetThresholds::default());
        assert_eq!(report.overall.low_confidence, 1);
    }

    #[test]
    fn test_empty_input() {
        let report = aggregate(&[], &TargetThresholds::default());
        assert_eq!(report.overall.total, 0);
        assert_eq!(report.pass_rate(), 0.0);
        assert!(report.targets.met.is_empty() && report.targets.not_met.is_empty());
    }
}
