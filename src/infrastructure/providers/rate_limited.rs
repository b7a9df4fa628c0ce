//! Shared request-rate gate for secondary-model clients.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::domain::ports::{CompletionClient, CompletionRequest, ProviderError};

/// Limiter allowing `per_second` calls per second, or `None` for zero.
pub fn shared_limiter(per_second: u32) -> Option<Arc<DefaultDirectRateLimiter>> {
    NonZeroU32::new(per_second).map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))))
}

/// Completion client that waits on a shared limiter before every call.
///
/// Retries made by the caller go through [`complete`](CompletionClient::complete)
/// again, so each attempt is counted.
pub struct RateLimitedClient {
    inner: Arc<dyn CompletionClient>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimitedClient {
    pub fn new(inner: Arc<dyn CompletionClient>, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        Self { inner, limiter }
    }

    /// Wrap `inner` when a limiter is configured, otherwise return it as is.
    pub fn wrap(
        inner: Arc<dyn CompletionClient>,
        limiter: Option<&Arc<DefaultDirectRateLimiter>>,
    ) -> Arc<dyn CompletionClient> {
        match limiter {
            Some(limiter) => Arc::new(Self::new(inner, Arc::clone(limiter))),
            None => inner,
        }
    }
}

#[async_trait]
impl CompletionClient for RateLimitedClient {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        self.limiter.until_ready().await;
        self.inner.complete(request).await
    }
}
