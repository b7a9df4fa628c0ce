pub mod aggregator;
pub mod evaluation_pipeline;
pub mod evaluator;
pub mod extraction;
pub mod harvester;
pub mod retry;
pub mod rubric;

pub use aggregator::{aggregate, normalize_error};
pub use evaluation_pipeline::EvaluationPipeline;
pub use evaluator::{evaluate, extraction_failed, resolve_tolerance};
pub use extraction::{AssistedExtractor, ExtractionError, PatternExtractor, ValueExtractor};
pub use harvester::{Harvester, HarvestSummary, ResumePolicy, TaskOutcome};
pub use retry::{RetryPolicy, Retryable};
pub use rubric::{apply_override, PrimaryStatus, RubricJudge};
