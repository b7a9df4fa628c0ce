//! Subjective rubric scoring with a hard numeric override.
//!
//! A judge model scores an answer on five weighted criteria. The score is
//! then corrected by the tolerance check of the task's primary field: the
//! calculation-accuracy criterion is forced to its maximum when the value is
//! within tolerance and to zero when it is not. A rubric pass requires both
//! the passing threshold and a non-zero calculation-accuracy score, so no
//! amount of presentation can rescue a wrong number.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::evaluator::resolve_tolerance;
use super::extraction::{recover_object, ExtractionError};
use super::retry::RetryPolicy;
use crate::domain::models::{
    EvaluationVerdict, RubricBreakdown, RubricConfig, RubricOverride, RubricScore, Task,
    ToleranceDefaults,
};
use crate::domain::ports::{CompletionClient, CompletionRequest};

/// Tolerance status of the task's primary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryStatus {
    Within,
    Outside,
    /// Nothing was extracted for the primary field
    Unknown,
}

impl PrimaryStatus {
    /// Read the primary field's status off a numeric verdict.
    pub fn from_verdict(task: &Task, verdict: &EvaluationVerdict) -> Self {
        let Some((primary, _)) = task.primary_field() else {
            return Self::Unknown;
        };
        if verdict.checks.iter().any(|c| c.field == primary) {
            Self::Within
        } else if verdict
            .failures
            .iter()
            .any(|f| f.field == primary && f.extracted.is_some())
        {
            Self::Outside
        } else {
            Self::Unknown
        }
    }
}

/// Apply the numeric override and recompute the pass flag.
pub fn apply_override(
    mut score: RubricScore,
    status: PrimaryStatus,
    config: &RubricConfig,
) -> RubricScore {
    let max = config.calculation_accuracy;
    let current = score.scores.calculation_accuracy;

    match status {
        PrimaryStatus::Within if current < max => {
            score.scores.calculation_accuracy = max;
            score.total += max - current;
            score.applied_override = Some(RubricOverride::Boosted);
        }
        PrimaryStatus::Outside if current > 0.0 => {
            score.scores.calculation_accuracy = 0.0;
            score.total -= current;
            score.applied_override = Some(RubricOverride::Zeroed);
        }
        _ => {}
    }

    score.passed =
        score.total >= config.passing_threshold && score.scores.calculation_accuracy > 0.0;
    score
}

/// Attach a rubric score to a numeric verdict.
///
/// The combined verdict passes only when both the numeric check and the
/// rubric pass.
pub fn fold_into(mut verdict: EvaluationVerdict, score: RubricScore) -> EvaluationVerdict {
    verdict.pass = verdict.pass && score.passed;
    verdict.rubric = Some(score);
    verdict
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgeScores {
    #[serde(default)]
    template_selection: f64,
    #[serde(default)]
    parameter_extraction: f64,
    #[serde(default)]
    calculation_accuracy: f64,
    #[serde(default)]
    code_quality: f64,
    #[serde(default)]
    interpretation_quality: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgeReply {
    #[serde(default)]
    scores: JudgeScores,
    total_score: Option<f64>,
    #[serde(default)]
    justification: Value,
    #[serde(default)]
    critical_errors: Vec<String>,
}

/// Scores answers with a judge model.
pub struct RubricJudge {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    config: RubricConfig,
    tolerance: ToleranceDefaults,
}

impl RubricJudge {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        retry: RetryPolicy,
        config: RubricConfig,
        tolerance: ToleranceDefaults,
    ) -> Self {
        Self {
            client,
            retry,
            config,
            tolerance,
        }
    }

    pub fn build_prompt(&self, task: &Task, raw_text: &str) -> String {
        let mut expected = String::new();
        for (field, value) in task.gating_fields() {
            let tol = resolve_tolerance(task, field, &self.tolerance);
            let _ = writeln!(expected, "- {field}: {value} (±{tol})");
        }
        let primary = task
            .primary_field()
            .map_or_else(|| "none".to_string(), |(field, value)| format!("{field} = {value}"));
        let c = &self.config;

        format!(
            "You are an expert biostatistician grading an answer to a quantitative question.\n\
             Judge the final answer, not the software or package used to reach it.\n\
             \n\
             ## QUESTION\n{question}\n\
             \n\
             ## EXPECTED VALUES\n\
             Category: {category}\n\
             {expected}\
             Primary value: {primary}\n\
             \n\
             ## ANSWER\n{raw_text}\n\
             \n\
             ## CRITERIA ({total} points)\n\
             1. templateSelection ({ts}): was the right analysis chosen?\n\
             2. parameterExtraction ({pe}): were the inputs read correctly from the question?\n\
             3. calculationAccuracy ({ca}): is the final value within tolerance of the expected value?\n\
             4. codeQuality ({cq}): would any code shown run and give the stated result?\n\
             5. interpretationQuality ({iq}): are results and assumptions explained clearly?\n\
             \n\
             ## OUTPUT\n\
             Reply with only a JSON object:\n\
             {{\"scores\": {{\"templateSelection\": n, \"parameterExtraction\": n, \
             \"calculationAccuracy\": n, \"codeQuality\": n, \"interpretationQuality\": n}}, \
             \"totalScore\": n, \"passed\": bool, \"justification\": \"...\", \
             \"criticalErrors\": [\"...\"]}}",
            question = task.question,
            category = task.category.as_deref().unwrap_or("unspecified"),
            total = c.total_weight(),
            ts = c.template_selection,
            pe = c.parameter_extraction,
            ca = c.calculation_accuracy,
            cq = c.code_quality,
            iq = c.interpretation_quality,
        )
    }

    /// Turn a recovered judge object into a raw (pre-override) score.
    pub fn score_from_object(&self, object: serde_json::Map<String, Value>) -> Result<RubricScore, ExtractionError> {
        let reply: JudgeReply = serde_json::from_value(Value::Object(object))
            .map_err(|e| ExtractionError::Unparseable(e.to_string()))?;

        let c = &self.config;
        let clamp = |value: f64, max: f64| value.clamp(0.0, max);
        let scores = RubricBreakdown {
            template_selection: clamp(reply.scores.template_selection, c.template_selection),
            parameter_extraction: clamp(reply.scores.parameter_extraction, c.parameter_extraction),
            calculation_accuracy: clamp(reply.scores.calculation_accuracy, c.calculation_accuracy),
            code_quality: clamp(reply.scores.code_quality, c.code_quality),
            interpretation_quality: clamp(
                reply.scores.interpretation_quality,
                c.interpretation_quality,
            ),
        };
        let total = reply.total_score.unwrap_or_else(|| scores.total());

        Ok(RubricScore {
            scores,
            total,
            passed: total >= c.passing_threshold,
            justification: flatten_justification(&reply.justification),
            critical_errors: reply.critical_errors,
            applied_override: None,
        })
    }

    /// Score one answer and apply the numeric override from its verdict.
    #[instrument(skip_all, fields(task_id = %task.id, judge = self.client.model()))]
    pub async fn judge(
        &self,
        task: &Task,
        raw_text: &str,
        verdict: &EvaluationVerdict,
    ) -> Result<RubricScore, ExtractionError> {
        let prompt = self.build_prompt(task, raw_text);
        let label = format!("judge {}", task.id);

        let raw = self
            .retry
            .execute(&label, |_| {
                let request = CompletionRequest::new(prompt.clone(), self.config.max_tokens);
                async move {
                    let reply = self.client.complete(request).await?;
                    let object = recover_object(&reply).ok_or_else(|| {
                        ExtractionError::Unparseable(reply.chars().take(200).collect())
                    })?;
                    self.score_from_object(object)
                }
            })
            .await
            .map_err(|exhausted| exhausted.last_error)?;

        let status = PrimaryStatus::from_verdict(task, verdict);
        let score = apply_override(raw, status, &self.config);
        if let Some(applied) = score.applied_override {
            info!(?applied, total = score.total, "rubric override applied");
        }
        debug!(total = score.total, passed = score.passed, "judged");
        Ok(score)
    }
}

fn flatten_justification(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, v)| match v {
                Value::String(text) => format!("{key}: {text}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExtractedFields, ExtractionMethod};
    use crate::services::evaluator::evaluate;

    fn score(calc: f64, total: f64) -> RubricScore {
        RubricScore {
            scores: RubricBreakdown {
                template_selection: 20.0,
                parameter_extraction: 20.0,
                calculation_accuracy: calc,
                code_quality: 10.0,
                interpretation_quality: total - 50.0 - calc,
            },
            total,
            passed: total >= 70.0,
            justification: String::new(),
            critical_errors: Vec::new(),
            applied_override: None,
        }
    }

    #[test]
    fn test_outside_tolerance_fails_despite_high_score() {
        let adjusted = apply_override(score(30.0, 85.0), PrimaryStatus::Outside, &RubricConfig::default());
        assert_eq!(adjusted.scores.calculation_accuracy, 0.0);
        assert_eq!(adjusted.total, 55.0);
        assert!(!adjusted.passed);
        assert_eq!(adjusted.applied_override, Some(RubricOverride::Zeroed));
    }

    #[test]
    fn test_outside_tolerance_with_zero_calc_still_fails() {
        let adjusted = apply_override(score(0.0, 85.0), PrimaryStatus::Outside, &RubricConfig::default());
        assert_eq!(adjusted.total, 85.0);
        assert!(!adjusted.passed);
        assert_eq!(adjusted.applied_override, None);
    }

    #[test]
    fn test_within_tolerance_boosts() {
        let adjusted = apply_override(score(10.0, 60.0), PrimaryStatus::Within, &RubricConfig::default());
        assert_eq!(adjusted.scores.calculation_accuracy, 30.0);
        assert_eq!(adjusted.total, 80.0);
        assert!(adjusted.passed);
        assert_eq!(adjusted.applied_override, Some(RubricOverride::Boosted));
    }

    #[test]
    fn test_unknown_status_leaves_score() {
        let adjusted = apply_override(score(25.0, 75.0), PrimaryStatus::Unknown, &RubricConfig::default());
        assert_eq!(adjusted.total, 75.0);
        assert!(adjusted.passed);
    }

    #[test]
    fn test_primary_status_from_verdict() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": "t1-x-001", "question": "q",
            "ground_truth": {"sample_size_per_group": 64, "power": 0.8},
        }))
        .unwrap();
        let defaults = ToleranceDefaults::default();

        let within = evaluate(
            &task,
            &ExtractedFields::new("t1-x-001", ExtractionMethod::Assisted)
                .with_value("sample_size_per_group", Some(66.0)),
            &defaults,
        );
        assert_eq!(PrimaryStatus::from_verdict(&task, &within), PrimaryStatus::Within);

        let outside = evaluate(
            &task,
            &ExtractedFields::new("t1-x-001", ExtractionMethod::Assisted)
                .with_value("sample_size_per_group", Some(90.0)),
            &defaults,
        );
        assert_eq!(PrimaryStatus::from_verdict(&task, &outside), PrimaryStatus::Outside);

        let missing = evaluate(
            &task,
            &ExtractedFields::new("t1-x-001", ExtractionMethod::Assisted),
            &defaults,
        );
        assert_eq!(PrimaryStatus::from_verdict(&task, &missing), PrimaryStatus::Unknown);
    }

    #[test]
    fn test_flatten_justification() {
        let object = serde_json::json!({"codeQuality": "runs", "templateSelection": "ok"});
        assert_eq!(flatten_justification(&object), "codeQuality: runs\ntemplateSelection: ok");
        assert_eq!(flatten_justification(&Value::Null), "");
    }
}
