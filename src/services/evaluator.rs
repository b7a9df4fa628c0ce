//! Tolerance evaluation of extracted values against ground truth.

use tracing::debug;

use crate::domain::models::{
    EvaluationVerdict, ExtractedFields, FailureReason, FieldCheck, FieldClass, FieldFailure,
    FieldFailureReason, MetadataCheck, Task, ToleranceDefaults,
};

/// Absorbs float noise such as `0.83 - 0.80` landing just above `0.03`.
const TOLERANCE_EPSILON: f64 = 1e-9;

/// Resolve the tolerance for one field.
///
/// Order: the task's entry for the field, the task's entry for the field's
/// class key, the class's fallback key (events use `sample_size`), then the
/// configured default for that class.
pub fn resolve_tolerance(task: &Task, field: &str, defaults: &ToleranceDefaults) -> f64 {
    let class = FieldClass::of(field);
    let key = class.tolerance_key();
    task.tolerance
        .get(field)
        .or_else(|| key.and_then(|k| task.tolerance.get(k)))
        .or_else(|| class.fallback_tolerance_key().and_then(|k| task.tolerance.get(k)))
        .copied()
        .unwrap_or_else(|| defaults.for_key(key))
}

/// Whether `extracted` lies within `tolerance` of `expected`.
pub fn within_tolerance(extracted: f64, expected: f64, tolerance: f64) -> bool {
    (extracted - expected).abs() <= tolerance + TOLERANCE_EPSILON
}

/// Compare every ground-truth field of `task` with the extracted values.
///
/// Gating fields decide the verdict. Informational fields land in
/// `metadata_checks` only.
pub fn evaluate(
    task: &Task,
    extracted: &ExtractedFields,
    defaults: &ToleranceDefaults,
) -> EvaluationVerdict {
    let mut checks = Vec::new();
    let mut failures = Vec::new();

    for (field, expected) in task.gating_fields() {
        let tolerance = resolve_tolerance(task, field, defaults);
        match extracted.get(field) {
            None => failures.push(FieldFailure {
                field: field.to_string(),
                expected,
                extracted: None,
                tolerance,
                diff: None,
                reason: FieldFailureReason::NoValueExtracted,
            }),
            Some(value) => {
                let diff = (value - expected).abs();
                if within_tolerance(value, expected, tolerance) {
                    checks.push(FieldCheck {
                        field: field.to_string(),
                        expected,
                        extracted: value,
                        tolerance,
                        diff,
                    });
                } else {
                    failures.push(FieldFailure {
                        field: field.to_string(),
                        expected,
                        extracted: Some(value),
                        tolerance,
                        diff: Some(diff),
                        reason: FieldFailureReason::ValueIncorrect,
                    });
                }
            }
        }
    }

    let metadata_checks = task
        .informational_fields()
        .map(|(field, expected)| {
            let value = extracted.get(field);
            MetadataCheck {
                field: field.to_string(),
                expected,
                extracted: value,
                diff: value.map(|v| (v - expected).abs()),
            }
        })
        .collect();

    let reason = classify(&failures);
    debug!(
        task_id = %task.id,
        passed = checks.len(),
        failed = failures.len(),
        reason = %reason,
        "evaluated"
    );

    EvaluationVerdict {
        task_id: task.id.clone(),
        tier: task.tier,
        category: task.category.clone(),
        pass: failures.is_empty(),
        reason,
        extracted: extracted.values.clone(),
        method: Some(extracted.method),
        checks,
        failures,
        metadata_checks,
        rubric: None,
        detail: None,
    }
}

/// Verdict for an answer that could not be read at all.
pub fn extraction_failed(task: &Task, detail: impl Into<String>) -> EvaluationVerdict {
    EvaluationVerdict {
        task_id: task.id.clone(),
        tier: task.tier,
        category: task.category.clone(),
        pass: false,
        reason: FailureReason::ExtractionFailed,
        extracted: Default::default(),
        method: None,
        checks: Vec::new(),
        failures: Vec::new(),
        metadata_checks: Vec::new(),
        rubric: None,
        detail: Some(detail.into()),
    }
}

fn classify(failures: &[FieldFailure]) -> FailureReason {
    if failures.is_empty() {
        return FailureReason::AllValuesMatch;
    }
    let missing = failures
        .iter()
        .filter(|f| f.reason == FieldFailureReason::NoValueExtracted)
        .count();
    if missing == failures.len() {
        FailureReason::NoNumericalAnswer
    } else if missing > 0 {
        FailureReason::PartialAnswer
    } else {
        FailureReason::ValueIncorrect
    }
}
