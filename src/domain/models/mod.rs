pub mod answer;
pub mod config;
pub mod field;
pub mod model_spec;
pub mod report;
pub mod task;
pub mod verdict;

pub use answer::{ProviderAnswer, RawAnswer, TokenUsage, TraceRecord};
pub use config::{
    Config, EvaluationConfig, ExtractionConfig, ExtractionMode, HarvestConfig,
    HttpProviderConfig, LoggingConfig, ProvidersConfig, RubricConfig, SessionProviderConfig,
    TargetThresholds, ToleranceDefaults,
};
pub use field::FieldClass;
pub use model_spec::{ModelSpec, ProviderKind};
pub use report::{
    AggregateReport, EvaluationSummary, GroupStats, ModelEvaluation, ModelSummaryRow, ScoreBands,
    TargetComparison, TierBreakdown,
};
pub use task::Task;
pub use verdict::{
    EvaluationVerdict, ExtractedFields, ExtractionMethod, FailureReason, FieldCheck,
    FieldFailure, FieldFailureReason, MetadataCheck, RubricBreakdown, RubricOverride,
    RubricScore,
};
