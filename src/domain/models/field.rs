//! Ground-truth field classification.
//!
//! Every numeric ground-truth field belongs to exactly one [`FieldClass`].
//! The class decides whether the field gates a verdict and which shared
//! tolerance key applies when the task does not name the field directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Candidate primary fields, highest priority first.
///
/// `power` only wins when none of the count fields before it are present,
/// which falls out of the ordering.
pub const PRIMARY_FIELD_PRIORITY: &[&str] = &[
    "sample_size_per_group",
    "subjects_per_group",
    "subjects_per_arm",
    "sample_size",
    "subjects",
    "per_cell",
    "subjects_per_cluster",
    "patients_per_cluster",
    "total_sample_size",
    "total_subjects",
    "power",
    "detectable_effect_d",
    "detectable_effect",
    "events_needed",
    "events",
];

const SAMPLE_SIZE_FIELDS: &[&str] = &[
    "sample_size",
    "sample_size_per_group",
    "total_sample_size",
    "total_subjects",
    "subjects",
    "subjects_per_arm",
    "subjects_per_group",
    "subjects_per_cell",
    "subjects_per_cluster",
    "patients_per_cluster",
    "per_cell",
    "n_per_group",
    "n_total",
];

const EVENT_FIELDS: &[&str] = &["events", "events_needed", "min_events", "required_events"];

const POWER_FIELDS: &[&str] = &["power", "achieved_power"];

const EFFECT_FIELDS: &[&str] = &[
    "detectable_effect",
    "detectable_effect_d",
    "minimum_detectable_effect",
];

/// Study parameters that answers tend to echo back. Compared for diagnostics only.
const INFORMATIONAL_FIELDS: &[&str] = &[
    "alpha",
    "annual_rate_increase",
    "baseline_annual_rate",
    "baseline_rate",
    "baseline_rate_poisson",
    "between_subject_d",
    "cause_specific_hr",
    "ci_width",
    "clusters_per_arm",
    "clusters_per_arm_poisson",
    "competing_risk_rate",
    "control_event_rate",
    "control_median_months",
    "control_primary_rate",
    "correlation_r",
    "cstatistic",
    "cure_rate_control",
    "cure_rate_treatment",
    "degrees_of_freedom",
    "delta",
    "dispersion_k",
    "effect_size",
    "effect_size_d",
    "effect_size_f",
    "effect_size_h",
    "effect_size_w",
    "event_rate",
    "expected_c_statistic",
    "followup_years",
    "followup_years_poisson",
    "hazard_ratio",
    "hazard_ratio_uncured",
    "icc",
    "icc_poisson",
    "interaction_or",
    "intercept",
    "main_or",
    "max_shrinkage",
    "mean_count_control",
    "mean_count_treatment",
    "mean_followup",
    "mean_nonzero_control",
    "mean_nonzero_treatment",
    "measurements",
    "median_survival_uncured",
    "nagrsquared",
    "num_factors",
    "num_groups",
    "num_periods",
    "num_runs",
    "num_treatments",
    "observation_period",
    "p1",
    "p2",
    "paired_d",
    "predictors",
    "prevalence",
    "r2",
    "r2_cs",
    "random_intercept_sd",
    "random_slope_sd",
    "rate_ratio",
    "replicates",
    "residual_sd",
    "sd",
    "slope_difference",
    "strata",
    "structural_zero_proportion",
    "study_duration_months",
    "subjects_per_cluster_poisson",
    "timepoint",
    "treatment_rate",
    "within_subject_correlation",
    "within_subject_icc",
];

/// Class of a ground-truth field, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    /// Subject or cluster counts
    SampleSize,
    /// Required event counts
    Events,
    /// Statistical power as a 0-1 decimal
    Power,
    /// Minimum detectable effect
    Effect,
    /// Unrecognized gating field, checked with its own or the global tolerance
    Other,
    /// Echoed study parameter, never gating
    Informational,
}

impl FieldClass {
    /// Classify a field by name.
    pub fn of(name: &str) -> Self {
        if INFORMATIONAL_FIELDS.contains(&name) {
            Self::Informational
        } else if SAMPLE_SIZE_FIELDS.contains(&name) {
            Self::SampleSize
        } else if EVENT_FIELDS.contains(&name) {
            Self::Events
        } else if POWER_FIELDS.contains(&name) {
            Self::Power
        } else if EFFECT_FIELDS.contains(&name) {
            Self::Effect
        } else {
            Self::Other
        }
    }

    /// Whether a failure in this field blocks the verdict.
    pub const fn is_gating(self) -> bool {
        !matches!(self, Self::Informational)
    }

    /// Shared tolerance-policy key for the class, if the class has one.
    pub const fn tolerance_key(self) -> Option<&'static str> {
        match self {
            Self::SampleSize => Some("sample_size"),
            Self::Events => Some("events"),
            Self::Power => Some("power"),
            Self::Effect => Some("effect_size"),
            Self::Other | Self::Informational => None,
        }
    }

    /// Task tolerance key consulted when the class key is absent.
    ///
    /// Event counts share the task's sample-size tolerance.
    pub const fn fallback_tolerance_key(self) -> Option<&'static str> {
        match self {
            Self::Events => Some("sample_size"),
            _ => None,
        }
    }

    /// Whether values of this class are whole counts.
    pub const fn is_count(self) -> bool {
        matches!(self, Self::SampleSize | Self::Events)
    }
}

impl fmt::Display for FieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SampleSize => "sample_size",
            Self::Events => "events",
            Self::Power => "power",
            Self::Effect => "effect",
            Self::Other => "other",
            Self::Informational => "informational",
        };
        write!(f, "{name}")
    }
}

/// Whether a count field names a per-group quantity.
pub fn is_per_group_field(name: &str) -> bool {
    name.contains("per_")
}

/// Whether a count field names a whole-study total.
///
/// Bare `sample_size` and `subjects` count every group together.
pub fn is_total_field(name: &str) -> bool {
    !is_per_group_field(name)
        && (name.contains("total") || matches!(name, "sample_size" | "subjects"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sample_size_fields() {
        assert_eq!(FieldClass::of("sample_size_per_group"), FieldClass::SampleSize);
        assert_eq!(FieldClass::of("total_subjects"), FieldClass::SampleSize);
        assert_eq!(FieldClass::of("subjects_per_cluster"), FieldClass::SampleSize);
    }

    #[test]
    fn test_informational_takes_precedence() {
        assert_eq!(FieldClass::of("clusters_per_arm"), FieldClass::Informational);
        assert_eq!(FieldClass::of("effect_size"), FieldClass::Informational);
        assert!(!FieldClass::of("alpha").is_gating());
    }

    #[test]
    fn test_unknown_field_is_gating() {
        let class = FieldClass::of("r_squared_required");
        assert_eq!(class, FieldClass::Other);
        assert!(class.is_gating());
        assert_eq!(class.tolerance_key(), None);
    }

    #[test]
    fn test_tolerance_keys() {
        assert_eq!(FieldClass::of("achieved_power").tolerance_key(), Some("power"));
        assert_eq!(FieldClass::of("detectable_effect").tolerance_key(), Some("effect_size"));
        assert_eq!(FieldClass::of("events_needed").tolerance_key(), Some("events"));
    }

    #[test]
    fn test_unit_hints() {
        assert!(is_per_group_field("subjects_per_arm"));
        assert!(is_total_field("total_sample_size"));
        assert!(!is_per_group_field("sample_size"));
        assert!(!is_per_group_field("subjects"));
        assert!(!is_per_group_field("total_subjects"));
    }

    #[test]
    fn test_bare_counts_are_totals() {
        assert!(is_total_field("sample_size"));
        assert!(is_total_field("subjects"));
        assert!(is_total_field("total_subjects"));
        assert!(is_total_field("n_total"));
        assert!(!is_total_field("sample_size_per_group"));
        assert!(!is_total_field("subjects_per_cluster"));
        assert!(!is_total_field("events_needed"));
    }

    #[test]
    fn test_events_fall_back_to_sample_size_tolerance() {
        assert_eq!(FieldClass::Events.fallback_tolerance_key(), Some("sample_size"));
        assert_eq!(FieldClass::Power.fallback_tolerance_key(), None);
    }
}
