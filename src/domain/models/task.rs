//! Benchmark task domain model.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::field::{FieldClass, PRIMARY_FIELD_PRIORITY};
use crate::domain::errors::{DomainError, DomainResult};

/// A parametrized quantitative problem with a known answer.
///
/// Tasks are immutable once loaded from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, conventionally prefixed with its tier (`t2-...`)
    pub id: String,

    /// Ordinal difficulty band. Zero means "derive from the id prefix".
    #[serde(default)]
    pub tier: u8,

    /// Question text sent to answer providers
    pub question: String,

    /// Numeric ground truth by field name. Non-numeric entries are dropped on load.
    #[serde(default, deserialize_with = "numeric_fields")]
    pub ground_truth: BTreeMap<String, f64>,

    /// Allowed absolute deviation, keyed by field name or class key
    #[serde(default)]
    pub tolerance: BTreeMap<String, f64>,

    /// Problem template or category, used for reporting
    #[serde(default, alias = "template", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Task {
    /// Fill in derived attributes and check the task invariants.
    ///
    /// A task must carry at least one gating numeric field.
    pub fn normalized(mut self) -> DomainResult<Self> {
        if self.id.trim().is_empty() {
            return Err(DomainError::InvalidTask {
                task_id: self.id,
                reason: "empty id".to_string(),
            });
        }
        if self.tier == 0 {
            self.tier = tier_from_id(&self.id).unwrap_or(0);
        }
        if self.gating_fields().next().is_none() {
            return Err(DomainError::InvalidTask {
                task_id: self.id,
                reason: "ground truth declares no primary numeric field".to_string(),
            });
        }
        Ok(self)
    }

    /// The single field a text-only extractor should look for.
    ///
    /// Resolved through [`PRIMARY_FIELD_PRIORITY`]; falls back to the first
    /// gating field in name order when none of the candidates are present.
    pub fn primary_field(&self) -> Option<(&str, f64)> {
        PRIMARY_FIELD_PRIORITY
            .iter()
            .find_map(|name| {
                self.ground_truth
                    .get_key_value(*name)
                    .map(|(k, v)| (k.as_str(), *v))
            })
            .or_else(|| self.gating_fields().next())
    }

    /// Fields whose correctness decides the verdict.
    pub fn gating_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.ground_truth
            .iter()
            .filter(|(name, _)| FieldClass::of(name).is_gating())
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Fields compared for diagnostics only.
    pub fn informational_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.ground_truth
            .iter()
            .filter(|(name, _)| !FieldClass::of(name).is_gating())
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Report label for the tier, e.g. `tier2`.
    pub fn tier_label(&self) -> String {
        format!("tier{}", self.tier)
    }
}

/// Parse the tier from a `tN-` id prefix.
pub fn tier_from_id(id: &str) -> Option<u8> {
    let rest = id.strip_prefix('t')?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with('-') {
        return None;
    }
    digits.parse().ok()
}

fn numeric_fields<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| value.as_f64().map(|number| (name, number)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_from(json: serde_json::Value) -> Task {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_tier_from_id() {
        assert_eq!(tier_from_id("t1-ttest-001"), Some(1));
        assert_eq!(tier_from_id("t12-x"), Some(12));
        assert_eq!(tier_from_id("task-1"), None);
        assert_eq!(tier_from_id("t3"), None);
    }

    #[test]
    fn test_non_numeric_ground_truth_dropped() {
        let task = task_from(serde_json::json!({
            "id": "t1-a",
            "question": "q",
            "ground_truth": {"sample_size_per_group": 64, "template": "two_sample_ttest"}
        }));
        assert_eq!(task.ground_truth.len(), 1);
        assert_eq!(task.ground_truth["sample_size_per_group"], 64.0);
    }

    #[test]
    fn test_normalized_derives_tier() {
        let task = task_from(serde_json::json!({
            "id": "t3-mixed-002",
            "question": "q",
            "ground_truth": {"power": 0.8}
        }))
        .normalized()
        .unwrap();
        assert_eq!(task.tier, 3);
        assert_eq!(task.tier_label(), "tier3");
    }

    #[test]
    fn test_normalized_rejects_informational_only() {
        let result = task_from(serde_json::json!({
            "id": "t1-a",
            "question": "q",
            "ground_truth": {"alpha": 0.05, "icc": 0.02}
        }))
        .normalized();
        assert!(matches!(result, Err(DomainError::InvalidTask { .. })));
    }

    #[test]
    fn test_primary_field_priority() {
        let task = task_from(serde_json::json!({
            "id": "t2-a",
            "question": "q",
            "ground_truth": {"total_sample_size": 128, "sample_size_per_group": 64, "power": 0.8}
        }));
        assert_eq!(task.primary_field(), Some(("sample_size_per_group", 64.0)));
    }

    #[test]
    fn test_primary_field_power_when_no_counts() {
        let task = task_from(serde_json::json!({
            "id": "t2-a",
            "question": "q",
            "ground_truth": {"power": 0.82, "alpha": 0.05}
        }));
        assert_eq!(task.primary_field(), Some(("power", 0.82)));
    }

    #[test]
    fn test_category_alias() {
        let task = task_from(serde_json::json!({
            "id": "t1-a",
            "question": "q",
            "template": "paired_ttest",
            "ground_truth": {"sample_size": 30}
        }));
        assert_eq!(task.category.as_deref(), Some("paired_ttest"));
    }
}
