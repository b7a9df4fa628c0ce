pub mod answer_provider;
pub mod completion_client;
pub mod outcome_store;
pub mod sleeper;

pub use answer_provider::{AnswerProvider, FailureKind, ProviderError};
pub use completion_client::{CompletionClient, CompletionRequest};
pub use outcome_store::{OutcomeMap, OutcomeStore};
pub use sleeper::{Sleeper, TokioSleeper};
