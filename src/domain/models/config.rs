use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model_spec::{default_catalog, ModelSpec, ProviderKind};

/// Instruction sent ahead of every benchmark question.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a biostatistics expert. Answer the following \
statistical power analysis or sample size calculation question. Provide your numerical answer \
clearly. Show your work/reasoning, then state the final answer prominently. If calculating \
sample size, round up to the nearest integer.";

/// Main configuration structure for quantbench
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Answer collection settings
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Value extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Tolerance defaults per field class
    #[serde(default)]
    pub tolerance: ToleranceDefaults,

    /// Subjective rubric weights and threshold
    #[serde(default)]
    pub rubric: RubricConfig,

    /// Target pass rates
    #[serde(default)]
    pub targets: TargetThresholds,

    /// Evaluation output settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Provider endpoints and credentials
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Harvest targets
    #[serde(default = "default_catalog")]
    pub models: Vec<ModelSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            harvest: HarvestConfig::default(),
            extraction: ExtractionConfig::default(),
            tolerance: ToleranceDefaults::default(),
            rubric: RubricConfig::default(),
            targets: TargetThresholds::default(),
            evaluation: EvaluationConfig::default(),
            providers: ProvidersConfig::default(),
            models: default_catalog(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Answer collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HarvestConfig {
    /// Task catalog: a JSON file or a directory of `tasks.json` files
    #[serde(default = "default_tasks_path")]
    pub tasks_path: String,

    /// Root directory for per-model outcome stores
    #[serde(default = "default_raw_dir")]
    pub output_dir: String,

    /// Provider calls per task before recording a terminal failure
    #[serde(default = "default_harvest_attempts")]
    pub max_attempts: u32,

    /// Base backoff after a rate-limit or overload response
    #[serde(default = "default_rate_limit_base_ms")]
    pub rate_limit_base_ms: u64,

    /// Ceiling for rate-limit backoff
    #[serde(default = "default_rate_limit_cap_ms")]
    pub rate_limit_cap_ms: u64,

    /// Base backoff after any other transient failure
    #[serde(default = "default_transient_base_ms")]
    pub transient_base_ms: u64,

    /// Hard timeout for one provider call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Inter-task delay per provider family
    #[serde(default = "default_provider_delays")]
    pub provider_delays_ms: BTreeMap<String, u64>,

    /// Inter-task delay for providers without an entry
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,

    /// Responses this short or shorter are not recognized successes
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,

    /// Treat recorded failures as final instead of retrying them next run
    #[serde(default)]
    pub accept_terminal_failures: bool,

    /// Instruction sent ahead of every question
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Output token ceiling per answer
    #[serde(default = "default_answer_max_tokens")]
    pub max_tokens: u32,
}

fn default_tasks_path() -> String {
    "tasks".to_string()
}

fn default_raw_dir() -> String {
    "results/raw-responses".to_string()
}

const fn default_harvest_attempts() -> u32 {
    5
}

const fn default_rate_limit_base_ms() -> u64 {
    10_000
}

const fn default_rate_limit_cap_ms() -> u64 {
    120_000
}

const fn default_transient_base_ms() -> u64 {
    2_000
}

const fn default_request_timeout_secs() -> u64 {
    600
}

fn default_provider_delays() -> BTreeMap<String, u64> {
    BTreeMap::from([
        (ProviderKind::OpenAi.to_string(), 1_500),
        (ProviderKind::Anthropic.to_string(), 2_000),
        (ProviderKind::Gemini.to_string(), 20_000),
    ])
}

const fn default_delay_ms() -> u64 {
    2_000
}

const fn default_min_response_chars() -> usize {
    20
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

const fn default_answer_max_tokens() -> u32 {
    16_384
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            tasks_path: default_tasks_path(),
            output_dir: default_raw_dir(),
            max_attempts: default_harvest_attempts(),
            rate_limit_base_ms: default_rate_limit_base_ms(),
            rate_limit_cap_ms: default_rate_limit_cap_ms(),
            transient_base_ms: default_transient_base_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            provider_delays_ms: default_provider_delays(),
            default_delay_ms: default_delay_ms(),
            min_response_chars: default_min_response_chars(),
            accept_terminal_failures: false,
            system_prompt: default_system_prompt(),
            max_tokens: default_answer_max_tokens(),
        }
    }
}

impl HarvestConfig {
    /// Inter-task delay for a model: its override, else its provider's, else the default.
    pub fn delay_for(&self, model: &ModelSpec) -> u64 {
        model.delay_ms.unwrap_or_else(|| {
            self.provider_delays_ms
                .get(model.provider.as_str())
                .copied()
                .unwrap_or(self.default_delay_ms)
        })
    }
}

/// How answers are turned into field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Phrase patterns only, no secondary model
    Pattern,
    /// Secondary model with structured output
    Assisted,
}

impl ExtractionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Assisted => "assisted",
        }
    }
}

/// Value extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractionConfig {
    /// Default extraction strategy
    #[serde(default = "default_extraction_mode")]
    pub mode: ExtractionMode,

    /// Items extracted in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Secondary-model requests per second across the pool
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Attempts per item before recording `extraction_failed`
    #[serde(default = "default_extraction_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step between extraction attempts
    #[serde(default = "default_extraction_retry_ms")]
    pub retry_delay_ms: u64,

    /// Allow the nearest-to-expected number fallback in pattern mode
    #[serde(default = "default_true")]
    pub allow_nearest_fallback: bool,

    /// Provider of the secondary model
    #[serde(default = "default_extractor_provider")]
    pub provider: ProviderKind,

    /// Secondary model id
    #[serde(default = "default_extractor_model")]
    pub model: String,

    /// Output token ceiling for an extraction reply
    #[serde(default = "default_extractor_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for one secondary-model call
    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_extraction_mode() -> ExtractionMode {
    ExtractionMode::Assisted
}

const fn default_concurrency() -> usize {
    5
}

const fn default_requests_per_second() -> u32 {
    5
}

const fn default_extraction_attempts() -> u32 {
    3
}

const fn default_extraction_retry_ms() -> u64 {
    5_000
}

const fn default_true() -> bool {
    true
}

const fn default_extractor_provider() -> ProviderKind {
    ProviderKind::Anthropic
}

fn default_extractor_model() -> String {
    "claude-sonnet-4-6".to_string()
}

const fn default_extractor_max_tokens() -> u32 {
    500
}

const fn default_extractor_timeout_secs() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: default_extraction_mode(),
            concurrency: default_concurrency(),
            requests_per_second: default_requests_per_second(),
            max_attempts: default_extraction_attempts(),
            retry_delay_ms: default_extraction_retry_ms(),
            allow_nearest_fallback: true,
            provider: default_extractor_provider(),
            model: default_extractor_model(),
            max_tokens: default_extractor_max_tokens(),
            timeout_secs: default_extractor_timeout_secs(),
        }
    }
}

/// Global tolerance defaults, used when a task names neither the field nor its class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToleranceDefaults {
    #[serde(default = "default_sample_size_tolerance")]
    pub sample_size: f64,

    #[serde(default = "default_events_tolerance")]
    pub events: f64,

    #[serde(default = "default_fraction_tolerance")]
    pub power: f64,

    #[serde(default = "default_fraction_tolerance")]
    pub effect_size: f64,

    /// Fields outside every class
    #[serde(default = "default_sample_size_tolerance")]
    pub default: f64,
}

const fn default_sample_size_tolerance() -> f64 {
    5.0
}

const fn default_events_tolerance() -> f64 {
    2.0
}

const fn default_fraction_tolerance() -> f64 {
    0.03
}

impl Default for ToleranceDefaults {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size_tolerance(),
            events: default_events_tolerance(),
            power: default_fraction_tolerance(),
            effect_size: default_fraction_tolerance(),
            default: default_sample_size_tolerance(),
        }
    }
}

impl ToleranceDefaults {
    /// Default for a class tolerance key (`sample_size`, `power`, ...).
    pub fn for_key(&self, key: Option<&str>) -> f64 {
        match key {
            Some("sample_size") => self.sample_size,
            Some("events") => self.events,
            Some("power") => self.power,
            Some("effect_size") => self.effect_size,
            _ => self.default,
        }
    }
}

/// Subjective rubric configuration. Weights sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RubricConfig {
    #[serde(default = "default_weight_20")]
    pub template_selection: f64,

    #[serde(default = "default_weight_20")]
    pub parameter_extraction: f64,

    #[serde(default = "default_weight_30")]
    pub calculation_accuracy: f64,

    #[serde(default = "default_weight_15")]
    pub code_quality: f64,

    #[serde(default = "default_weight_15")]
    pub interpretation_quality: f64,

    /// Minimum total for a rubric pass
    #[serde(default = "default_passing_threshold")]
    pub passing_threshold: f64,

    /// Judge model id
    #[serde(default = "default_extractor_model")]
    pub judge_model: String,

    /// Output token ceiling for a judge reply
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
}

const fn default_weight_20() -> f64 {
    20.0
}

const fn default_weight_30() -> f64 {
    30.0
}

const fn default_weight_15() -> f64 {
    15.0
}

const fn default_passing_threshold() -> f64 {
    70.0
}

const fn default_judge_max_tokens() -> u32 {
    4_000
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            template_selection: default_weight_20(),
            parameter_extraction: default_weight_20(),
            calculation_accuracy: default_weight_30(),
            code_quality: default_weight_15(),
            interpretation_quality: default_weight_15(),
            passing_threshold: default_passing_threshold(),
            judge_model: default_extractor_model(),
            max_tokens: default_judge_max_tokens(),
        }
    }
}

impl RubricConfig {
    pub fn total_weight(&self) -> f64 {
        self.template_selection
            + self.parameter_extraction
            + self.calculation_accuracy
            + self.code_quality
            + self.interpretation_quality
    }
}

/// Target pass rates compared by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetThresholds {
    #[serde(default = "default_overall_target")]
    pub overall: f64,

    /// Keyed by tier label, e.g. `tier1`
    #[serde(default = "default_tier_targets")]
    pub by_tier: BTreeMap<String, f64>,

    /// Keyed by task category
    #[serde(default)]
    pub by_category: BTreeMap<String, f64>,
}

const fn default_overall_target() -> f64 {
    0.80
}

fn default_tier_targets() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("tier1".to_string(), 0.95),
        ("tier2".to_string(), 0.85),
        ("tier3".to_string(), 0.75),
        ("tier4".to_string(), 0.70),
    ])
}

impl Default for TargetThresholds {
    fn default() -> Self {
        Self {
            overall: default_overall_target(),
            by_tier: default_tier_targets(),
            by_category: BTreeMap::new(),
        }
    }
}

/// Evaluation output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvaluationConfig {
    /// Root directory for evaluation results
    #[serde(default = "default_evaluation_dir")]
    pub output_dir: String,

    /// Pass rate at or above which the process exits successfully
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

fn default_evaluation_dir() -> String {
    "results/evaluations".to_string()
}

const fn default_pass_threshold() -> f64 {
    0.7
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            output_dir: default_evaluation_dir(),
            pass_threshold: default_pass_threshold(),
        }
    }
}

/// Endpoint and credential source for one HTTP provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpProviderConfig {
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,
}

/// Scripted session driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionProviderConfig {
    /// Executable that drives one session per invocation
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments passed before `--model <id>`
    #[serde(default)]
    pub args: Vec<String>,
}

/// Provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProvidersConfig {
    #[serde(default = "default_openai")]
    pub openai: HttpProviderConfig,

    #[serde(default = "default_anthropic")]
    pub anthropic: HttpProviderConfig,

    #[serde(default = "default_gemini")]
    pub gemini: HttpProviderConfig,

    #[serde(default)]
    pub session: SessionProviderConfig,
}

fn default_openai() -> HttpProviderConfig {
    HttpProviderConfig {
        base_url: "https://api.openai.com".to_string(),
        api_key_env: "OPENAI_API_KEY".to_string(),
    }
}

fn default_anthropic() -> HttpProviderConfig {
    HttpProviderConfig {
        base_url: "https://api.anthropic.com".to_string(),
        api_key_env: "ANTHROPIC_API_KEY".to_string(),
    }
}

fn default_gemini() -> HttpProviderConfig {
    HttpProviderConfig {
        base_url: "https://generativelanguage.googleapis.com".to_string(),
        api_key_env: "GEMINI_API_KEY".to_string(),
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            anthropic: default_anthropic(),
            gemini: default_gemini(),
            session: SessionProviderConfig::default(),
        }
    }
}

impl ProvidersConfig {
    /// HTTP settings for a provider family; `None` for the session driver.
    pub const fn http(&self, kind: ProviderKind) -> Option<&HttpProviderConfig> {
        match kind {
            ProviderKind::OpenAi => Some(&self.openai),
            ProviderKind::Anthropic => Some(&self.anthropic),
            ProviderKind::Gemini => Some(&self.gemini),
            ProviderKind::Session => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_model_override() {
        let harvest = HarvestConfig::default();
        let catalog = default_catalog();
        let preview = catalog
            .iter()
            .find(|m| m.id == "gemini-3.1-pro-preview")
            .unwrap();
        let flash = catalog.iter().find(|m| m.id == "gemini-2.5-flash").unwrap();
        assert_eq!(harvest.delay_for(preview), 45_000);
        assert_eq!(harvest.delay_for(flash), 20_000);
    }

    #[test]
    fn test_delay_for_unknown_provider() {
        let harvest = HarvestConfig::default();
        let model = ModelSpec::new("driver", ProviderKind::Session, "Driver");
        assert_eq!(harvest.delay_for(&model), 2_000);
    }

    #[test]
    fn test_rubric_weights_sum_to_100() {
        let rubric = RubricConfig::default();
        assert!((rubric.total_weight() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tolerance_for_key() {
        let tol = ToleranceDefaults::default();
        assert!((tol.for_key(Some("power")) - 0.03).abs() < f64::EPSILON);
        assert!((tol.for_key(None) - 5.0).abs() < f64::EPSILON);
    }
}
