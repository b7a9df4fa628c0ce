//! Outcome store port - durable per-model record of harvested answers.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::RawAnswer;

/// All recorded outcomes for one model, keyed by task id.
pub type OutcomeMap = BTreeMap<String, RawAnswer>;

/// Durable storage for one model's outcomes.
///
/// Read once at startup and rewritten in full after every task. A single
/// harvester owns a store; concurrent writers are not supported.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Load every recorded outcome. A missing store is empty.
    async fn load(&self) -> DomainResult<OutcomeMap>;

    /// Replace the stored document with `outcomes`.
    ///
    /// Must be atomic: a crash leaves either the old or the new document.
    async fn save(&self, outcomes: &OutcomeMap) -> DomainResult<()>;
}
