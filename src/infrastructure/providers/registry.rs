//! Builds providers and completion clients from configuration and environment.

use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicClient;
use super::gemini::GeminiClient;
use super::openai::OpenAiClient;
use super::session::SessionProvider;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, HttpProviderConfig, ModelSpec, ProviderKind};
use crate::domain::ports::{AnswerProvider, CompletionClient};

/// Which catalog entries a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// One model, by id or slug
    Model(String),
    /// Every model of a provider family
    Provider(ProviderKind),
    /// The whole catalog
    All,
}

/// Explicitly constructed provider factory. Holds no clients itself.
pub struct ProviderRegistry {
    config: Arc<Config>,
}

impl ProviderRegistry {
    pub const fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn catalog(&self) -> &[ModelSpec] {
        &self.config.models
    }

    /// Resolve a selector against the catalog, in catalog order.
    pub fn resolve(&self, selector: &TargetSelector) -> DomainResult<Vec<ModelSpec>> {
        let models: Vec<ModelSpec> = match selector {
            TargetSelector::Model(name) => self
                .catalog()
                .iter()
                .filter(|m| m.id == *name || m.slug == *name)
                .take(1)
                .cloned()
                .collect(),
            TargetSelector::Provider(kind) => self
                .catalog()
                .iter()
                .filter(|m| m.provider == *kind)
                .cloned()
                .collect(),
            TargetSelector::All => self.catalog().to_vec(),
        };

        if models.is_empty() {
            return Err(match selector {
                TargetSelector::Model(name) => DomainError::UnknownModel(name.clone()),
                TargetSelector::Provider(kind) => {
                    DomainError::UnknownModel(format!("no models configured for provider {kind}"))
                }
                TargetSelector::All => DomainError::UnknownModel("model catalog is empty".to_string()),
            });
        }
        Ok(models)
    }

    /// Whether credentials or a driver are available for `kind`.
    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        match self.config.providers.http(kind) {
            Some(http) => std::env::var(&http.api_key_env).is_ok_and(|v| !v.trim().is_empty()),
            None => self.config.providers.session.command.is_some(),
        }
    }

    fn api_key(http: &HttpProviderConfig) -> DomainResult<String> {
        std::env::var(&http.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                DomainError::ProviderNotConfigured(format!(
                    "{} environment variable not set",
                    http.api_key_env
                ))
            })
    }

    /// Answer provider for one harvest target.
    pub fn answer_provider(&self, model: &ModelSpec) -> DomainResult<Arc<dyn AnswerProvider>> {
        let harvest = &self.config.harvest;
        let timeout = Duration::from_secs(harvest.request_timeout_secs);
        let prompt = harvest.system_prompt.clone();
        let not_configured = |e: crate::domain::ports::ProviderError| {
            DomainError::ProviderNotConfigured(format!("{}: {e}", model.provider))
        };

        let provider: Arc<dyn AnswerProvider> = match model.provider {
            ProviderKind::Anthropic => {
                let http = &self.config.providers.anthropic;
                Arc::new(
                    AnthropicClient::new(&http.base_url, Self::api_key(http)?, &model.id, timeout)
                        .map_err(not_configured)?
                        .with_system_prompt(prompt)
                        .with_max_tokens(harvest.max_tokens),
                )
            }
            ProviderKind::OpenAi => {
                let http = &self.config.providers.openai;
                Arc::new(
                    OpenAiClient::new(&http.base_url, Self::api_key(http)?, &model.id, timeout)
                        .map_err(not_configured)?
                        .reasoning(model.reasoning)
                        .with_system_prompt(prompt)
                        .with_max_tokens(harvest.max_tokens),
                )
            }
            ProviderKind::Gemini => {
                let http = &self.config.providers.gemini;
                Arc::new(
                    GeminiClient::new(&http.base_url, Self::api_key(http)?, &model.id, timeout)
                        .map_err(not_configured)?
                        .with_system_prompt(prompt),
                )
            }
            ProviderKind::Session => {
                let session = &self.config.providers.session;
                let command = session.command.clone().ok_or_else(|| {
                    DomainError::ProviderNotConfigured(
                        "providers.session.command is not set".to_string(),
                    )
                })?;
                Arc::new(SessionProvider::new(command, session.args.clone(), &model.id))
            }
        };
        Ok(provider)
    }

    /// Secondary model for assisted extraction and rubric judging.
    pub fn completion_client(
        &self,
        kind: ProviderKind,
        model: &str,
    ) -> DomainResult<Arc<dyn CompletionClient>> {
        let timeout = Duration::from_secs(self.config.extraction.timeout_secs);
        let not_configured =
            |e: crate::domain::ports::ProviderError| DomainError::ProviderNotConfigured(format!("{kind}: {e}"));

        let client: Arc<dyn CompletionClient> = match kind {
            ProviderKind::Anthropic => {
                let http = &self.config.providers.anthropic;
                Arc::new(
                    AnthropicClient::new(&http.base_url, Self::api_key(http)?, model, timeout)
                        .map_err(not_configured)?,
                )
            }
            ProviderKind::OpenAi => {
                let http = &self.config.providers.openai;
                Arc::new(
                    OpenAiClient::new(&http.base_url, Self::api_key(http)?, model, timeout)
                        .map_err(not_configured)?,
                )
            }
            ProviderKind::Gemini => {
                let http = &self.config.providers.gemini;
                Arc::new(
                    GeminiClient::new(&http.base_url, Self::api_key(http)?, model, timeout)
                        .map_err(not_configured)?,
                )
            }
            ProviderKind::Session => {
                return Err(DomainError::ProviderNotConfigured(
                    "a session driver cannot serve as the extraction model".to_string(),
                ))
            }
        };
        Ok(client)
    }
}
