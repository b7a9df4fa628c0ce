//! quantbench - Quantitative answer benchmark
//!
//! quantbench collects answers from large language models to quantitative
//! study-design questions (sample size, power, detectable effect, event
//! counts), pulls the numbers back out of free text, and scores them against
//! ground truth within per-field tolerances.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Tasks, answers, verdicts, reports and ports
//! - **Service Layer** (`services`): Harvesting, extraction, evaluation and aggregation
//! - **Infrastructure Layer** (`infrastructure`): Providers, storage, config and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use quantbench::services::{aggregate, evaluate, PatternExtractor};
//!
//! let fields = PatternExtractor::default().extract_fields(&task, &answer_text);
//! let verdict = evaluate(&task, &fields, &config.tolerance);
//! let report = aggregate(&[verdict], &config.targets);
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AggregateReport, Config, EvaluationVerdict, ModelSpec, ProviderKind, RawAnswer, Task,
};
pub use domain::ports::{AnswerProvider, CompletionClient, OutcomeStore, ProviderError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EvaluationPipeline, Harvester};
