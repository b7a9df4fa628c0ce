//! Answer providers and completion clients.
//!
//! REST providers (Anthropic, OpenAI, Gemini) and the scripted session
//! driver all implement [`AnswerProvider`](crate::domain::ports::AnswerProvider).
//! The REST clients double as [`CompletionClient`](crate::domain::ports::CompletionClient)s
//! for assisted extraction and rubric judging, behind a shared
//! [`RateLimitedClient`] gate.

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod rate_limited;
pub mod registry;
pub mod session;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use rate_limited::{shared_limiter, RateLimitedClient};
pub use registry::{ProviderRegistry, TargetSelector};
pub use session::SessionProvider;
