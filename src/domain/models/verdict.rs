//! Extraction results and evaluation verdicts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a set of field values was obtained from an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Phrase patterns over the raw text
    Pattern,
    /// Closest number to the expected value. Low confidence: the expected
    /// value itself steered the pick.
    NearestFallback,
    /// Secondary model returned structured values
    Assisted,
}

impl ExtractionMethod {
    pub const fn is_low_confidence(self) -> bool {
        matches!(self, Self::NearestFallback)
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pattern => "pattern",
            Self::NearestFallback => "nearest_fallback",
            Self::Assisted => "assisted",
        };
        f.write_str(name)
    }
}

/// Field values pulled out of one answer. Absent values are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub task_id: String,
    pub values: BTreeMap<String, Option<f64>>,
    pub method: ExtractionMethod,
}

impl ExtractedFields {
    pub fn new(task_id: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            task_id: task_id.into(),
            values: BTreeMap::new(),
            method,
        }
    }

    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: Option<f64>) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Extracted value for a field, if one was found.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().flatten()
    }
}

/// A field that matched its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCheck {
    pub field: String,
    pub expected: f64,
    pub extracted: f64,
    pub tolerance: f64,
    pub diff: f64,
}

/// Why a single field failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFailureReason {
    NoValueExtracted,
    ValueIncorrect,
}

impl fmt::Display for FieldFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoValueExtracted => f.write_str("no value extracted"),
            Self::ValueIncorrect => f.write_str("value incorrect"),
        }
    }
}

/// A gating field that did not match its ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub field: String,
    pub expected: f64,
    pub extracted: Option<f64>,
    pub tolerance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<f64>,
    pub reason: FieldFailureReason,
}

impl FieldFailure {
    /// Human-readable summary, e.g. `power: 0.7 vs 0.8 (off by 0.10, tol=0.03)`.
    pub fn describe(&self) -> String {
        match (self.extracted, self.diff) {
            (Some(value), Some(diff)) => format!(
                "{}: {} vs {} (off by {:.2}, tol={})",
                self.field, value, self.expected, diff, self.tolerance
            ),
            _ => format!("{}: {} (expected {})", self.field, self.reason, self.expected),
        }
    }
}

/// Diagnostic comparison of an informational field. Never gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataCheck {
    pub field: String,
    pub expected: f64,
    pub extracted: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<f64>,
}

/// Overall outcome category of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AllValuesMatch,
    NoNumericalAnswer,
    PartialAnswer,
    ValueIncorrect,
    ExtractionFailed,
}

impl FailureReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllValuesMatch => "all_values_match",
            Self::NoNumericalAnswer => "no_numerical_answer",
            Self::PartialAnswer => "partial_answer",
            Self::ValueIncorrect => "value_incorrect",
            Self::ExtractionFailed => "extraction_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subjective rubric sub-scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricBreakdown {
    #[serde(default)]
    pub template_selection: f64,
    #[serde(default)]
    pub parameter_extraction: f64,
    #[serde(default)]
    pub calculation_accuracy: f64,
    #[serde(default)]
    pub code_quality: f64,
    #[serde(default)]
    pub interpretation_quality: f64,
}

impl RubricBreakdown {
    pub fn total(&self) -> f64 {
        self.template_selection
            + self.parameter_extraction
            + self.calculation_accuracy
            + self.code_quality
            + self.interpretation_quality
    }

    /// Criteria as `(name, score)` pairs, for per-criterion reporting.
    pub fn criteria(&self) -> [(&'static str, f64); 5] {
        [
            ("template_selection", self.template_selection),
            ("parameter_extraction", self.parameter_extraction),
            ("calculation_accuracy", self.calculation_accuracy),
            ("code_quality", self.code_quality),
            ("interpretation_quality", self.interpretation_quality),
        ]
    }
}

/// Direction of a numeric override applied to a rubric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricOverride {
    /// Value in tolerance: calculation accuracy forced to its maximum
    Boosted,
    /// Value out of tolerance: calculation accuracy forced to zero
    Zeroed,
}

/// A rubric score, before or after the numeric override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub scores: RubricBreakdown,
    pub total: f64,
    pub passed: bool,
    #[serde(default)]
    pub justification: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_override: Option<RubricOverride>,
}

/// Pass/fail verdict for one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub task_id: String,
    pub tier: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub pass: bool,
    pub reason: FailureReason,
    #[serde(default)]
    pub extracted: BTreeMap<String, Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ExtractionMethod>,
    #[serde(default)]
    pub checks: Vec<FieldCheck>,
    #[serde(default)]
    pub failures: Vec<FieldFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_checks: Vec<MetadataCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<RubricScore>,
    /// Why no verdict could be computed, for `extraction_failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EvaluationVerdict {
    /// Whether the extracted values came from the low-confidence fallback.
    pub fn is_low_confidence(&self) -> bool {
        self.method.is_some_and(ExtractionMethod::is_low_confidence)
    }

    /// One line per failed field, for reports.
    pub fn failure_summaries(&self) -> Vec<String> {
        if self.failures.is_empty() {
            return self.detail.iter().cloned().collect();
        }
        self.failures.iter().map(FieldFailure::describe).collect()
    }
}
