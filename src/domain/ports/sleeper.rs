//! Sleeper port - injectable delay source for retry and pacing.

use async_trait::async_trait;
use std::time::Duration;

/// Something that can wait.
///
/// Production code uses tokio's timer; tests record requested delays and
/// return immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
