use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::{AnswerOutcome, Query};

/// The fan-out engine's seam to the persistent answer cache.
///
/// Lookups degrade internally: a store that cannot be reached answers
/// "all misses" and the request proceeds without a cache. Only
/// `store_answers` reports errors, and the engine merely logs them.
#[async_trait]
pub trait AnswerCache: Send + Sync {
    /// One round-trip mapping every requested provider name to its cached
    /// answer (or `None`). The result key set equals the input name set.
    async fn cached_answers(
        &self,
        query: &Query,
        providers: &[String],
    ) -> HashMap<String, Option<AnswerOutcome>>;

    /// Any provider's cached answer for the question, regardless of which
    /// provider produced it. Backs the local-cache adapter.
    async fn any_cached_answer(&self, query: &Query) -> Option<AnswerOutcome>;

    /// Write-through of freshly obtained answers, keyed per provider name.
    /// Idempotent; re-observing an answer replaces the pointer in place.
    async fn store_answers(
        &self,
        query: &Query,
        entries: &[(String, AnswerOutcome)],
    ) -> anyhow::Result<()>;
}

/// Cache that holds nothing: every lookup misses, every write is dropped.
///
/// This is the supported degraded mode when no database is configured, and
/// doubles as the baseline stub in engine tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait]
impl AnswerCache for NullCache {
    async fn cached_answers(
        &self,
        _query: &Query,
        providers: &[String],
    ) -> HashMap<String, Option<AnswerOutcome>> {
        providers.iter().map(|name| (name.clone(), None)).collect()
    }

    async fn any_cached_answer(&self, _query: &Query) -> Option<AnswerOutcome> {
        None
    }

    async fn store_answers(
        &self,
        _query: &Query,
        _entries: &[(String, AnswerOutcome)],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
