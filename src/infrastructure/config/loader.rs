use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_attempts for {0}: cannot be 0")]
    InvalidMaxAttempts(&'static str),

    #[error(
        "Invalid backoff configuration: rate_limit_base_ms ({0}) must not exceed rate_limit_cap_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid request timeout: must be at least 1 second")]
    InvalidTimeout,

    #[error("Invalid extraction concurrency or rate: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("Invalid tolerance for {0}: {1}. Must be non-negative")]
    InvalidTolerance(&'static str, f64),

    #[error("Invalid rubric weights: they sum to {0}, expected 100")]
    InvalidRubricWeights(f64),

    #[error("Invalid threshold for {0}: {1}. Must be between 0 and 1")]
    InvalidThreshold(String, f64),

    #[error("Duplicate model id or slug in catalog: {0}")]
    DuplicateModel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .quantbench/config.yaml (project config)
    /// 3. .quantbench/local.yaml (local overrides, optional)
    /// 4. Environment variables (QUANTBENCH_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Like [`ConfigLoader::load`], resolving `.quantbench/` under `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(".quantbench");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("QUANTBENCH_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("QUANTBENCH_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let harvest = &config.harvest;
        if harvest.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts("harvest"));
        }
        if harvest.rate_limit_base_ms > harvest.rate_limit_cap_ms {
            return Err(ConfigError::InvalidBackoff(
                harvest.rate_limit_base_ms,
                harvest.rate_limit_cap_ms,
            ));
        }
        if harvest.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        let extraction = &config.extraction;
        if extraction.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts("extraction"));
        }
        if extraction.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(0));
        }
        if extraction.requests_per_second == 0 {
            return Err(ConfigError::InvalidConcurrency(0));
        }

        let tolerance = &config.tolerance;
        for (key, value) in [
            ("sample_size", tolerance.sample_size),
            ("events", tolerance.events),
            ("power", tolerance.power),
            ("effect_size", tolerance.effect_size),
            ("default", tolerance.default),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidTolerance(key, value));
            }
        }

        let rubric = &config.rubric;
        let weights = [
            rubric.template_selection,
            rubric.parameter_extraction,
            rubric.calculation_accuracy,
            rubric.code_quality,
            rubric.interpretation_quality,
        ];
        if weights.iter().any(|w| !(*w >= 0.0)) || (rubric.total_weight() - 100.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidRubricWeights(rubric.total_weight()));
        }
        if !(0.0..=100.0).contains(&rubric.passing_threshold) {
            return Err(ConfigError::ValidationFailed(format!(
                "rubric passing_threshold {} must be between 0 and 100",
                rubric.passing_threshold
            )));
        }

        let unit = 0.0..=1.0;
        if !unit.contains(&config.targets.overall) {
            return Err(ConfigError::InvalidThreshold(
                "targets.overall".to_string(),
                config.targets.overall,
            ));
        }
        for (scope, value) in config
            .targets
            .by_tier
            .iter()
            .chain(config.targets.by_category.iter())
        {
            if !unit.contains(value) {
                return Err(ConfigError::InvalidThreshold(scope.clone(), *value));
            }
        }
        if !unit.contains(&config.evaluation.pass_threshold) {
            return Err(ConfigError::InvalidThreshold(
                "evaluation.pass_threshold".to_string(),
                config.evaluation.pass_threshold,
            ));
        }

        let mut seen = HashSet::new();
        for model in &config.models {
            if model.id.trim().is_empty() || model.slug.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "model id and slug cannot be empty".to_string(),
                ));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(ConfigError::DuplicateModel(model.id.clone()));
            }
            if model.slug != model.id && !seen.insert(model.slug.as_str()) {
                return Err(ConfigError::DuplicateModel(model.slug.clone()));
            }
        }

        Ok(())
    }
}
