//! Per-request fan-out: cache lookup, bounded concurrent adapter dispatch,
//! fault isolation, detached write-through, aggregation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::adapter::Adapter;
use crate::aggregate::construct_result;
use crate::cache::AnswerCache;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, SearchResult};

/// Upper bound on concurrently outstanding adapter calls per request.
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

pub struct SearchEngine {
    registry: Arc<Registry>,
    cache: Arc<dyn AnswerCache>,
    max_concurrency: usize,
}

impl SearchEngine {
    pub fn new(registry: Arc<Registry>, cache: Arc<dyn AnswerCache>) -> Self {
        Self {
            registry,
            cache,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run one search over an already-resolved provider list.
    ///
    /// Sequence per request: split out cache-bypassing adapters, batch
    /// cache lookup for the rest, fan out misses under the semaphore,
    /// queue successful cacheable results for detached write-through,
    /// aggregate cached and fresh answers together.
    pub async fn search(
        &self,
        query: &Query,
        providers: Vec<ProviderChoice>,
    ) -> Result<SearchResult> {
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        // Non-cacheable adapters (the local cache) bypass the batched
        // lookup and go straight into the dispatch list.
        let mut to_dispatch: Vec<(Arc<dyn Adapter>, ProviderChoice)> = Vec::new();
        let mut cache_eligible: Vec<(Arc<dyn Adapter>, ProviderChoice)> = Vec::new();
        for provider in providers {
            match self.registry.get(&provider.name) {
                None => {
                    tracing::warn!(provider = %provider.name, "unknown provider requested, skipping");
                }
                Some(adapter) if !adapter.descriptor().cacheable => {
                    to_dispatch.push((adapter, provider));
                }
                Some(adapter) => cache_eligible.push((adapter, provider)),
            }
        }

        let mut from_cache: Vec<AnswerOutcome> = Vec::new();
        if !cache_eligible.is_empty() {
            let names: Vec<String> = cache_eligible
                .iter()
                .map(|(_, p)| p.name.clone())
                .collect();
            let mut cached = self.cache.cached_answers(query, &names).await;
            for (adapter, provider) in cache_eligible {
                match cached.remove(&provider.name).flatten() {
                    Some(answer) => {
                        tracing::debug!(provider = %provider.name, "cache hit");
                        from_cache.push(answer);
                    }
                    None => to_dispatch.push((adapter, provider)),
                }
            }
        }

        let fresh = self.fan_out(query, to_dispatch).await;

        let mut write_through: Vec<(String, AnswerOutcome)> = Vec::new();
        for (cacheable, answer) in &fresh {
            if *cacheable && answer.success {
                write_through.push((answer.provider.clone(), answer.clone()));
            }
        }
        if !write_through.is_empty() {
            // Detached task on an independently acquired store session; a
            // failure here never reaches the response.
            let cache = Arc::clone(&self.cache);
            let query = query.clone();
            tokio::spawn(async move {
                if let Err(error) = cache.store_answers(&query, &write_through).await {
                    tracing::error!(%error, "cache write-through failed");
                }
            });
        }

        let mut answers = from_cache;
        answers.extend(fresh.into_iter().map(|(_, answer)| answer));

        let result = construct_result(query, answers);
        tracing::info!(
            total = result.total_providers,
            successful = result.successful_providers,
            failed = result.failed_providers,
            "search complete"
        );
        Ok(result)
    }

    /// Dispatch every pending adapter concurrently, bounded by the
    /// per-request semaphore. Every call runs to completion; a panicking
    /// adapter is converted into an `unknown` failure without disturbing
    /// its peers. Results come back in completion order, tagged with the
    /// adapter's cacheable flag.
    ///
    /// Dropping the future (client disconnect) aborts the whole
    /// `JoinSet`, so in-flight adapter calls are cancelled with it.
    async fn fan_out(
        &self,
        query: &Query,
        pending: Vec<(Arc<dyn Adapter>, ProviderChoice)>,
    ) -> Vec<(bool, AnswerOutcome)> {
        if pending.is_empty() {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<(bool, AnswerOutcome)> = JoinSet::new();
        let mut identities: HashMap<tokio::task::Id, String> = HashMap::new();
        let qtype = query.qtype;

        for (adapter, provider) in pending {
            let semaphore = Arc::clone(&semaphore);
            let query = query.clone();
            let cacheable = adapter.descriptor().cacheable;
            let provider_name = provider.name.clone();
            let handle = tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails if
                // this request is already being torn down.
                let _permit = semaphore.acquire().await;
                (cacheable, adapter.search(&query, &provider).await)
            });
            identities.insert(handle.id(), provider_name);
        }

        let mut results = Vec::with_capacity(identities.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => results.push(outcome),
                Err(join_error) => {
                    let provider = identities
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::error!(%provider, %join_error, "adapter task failed outside its contract");
                    results.push((
                        true,
                        AnswerOutcome::failure(
                            provider,
                            qtype,
                            ErrorKind::Unknown,
                            format!("适配器内部错误: {join_error}"),
                        ),
                    ));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterDescriptor;
    use crate::cache::NullCache;
    use crate::types::QuestionType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted adapter for engine behavior tests.
    struct StubAdapter {
        descriptor: AdapterDescriptor,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[derive(Clone)]
    enum Behavior {
        Answer(Vec<String>),
        Fail(ErrorKind),
        Panic,
        Slow(Duration, Vec<String>),
    }

    impl StubAdapter {
        fn new(name: &str, behavior: Behavior) -> Self {
            Self {
                descriptor: AdapterDescriptor::new(name, "https://stub.invalid/"),
                behavior,
                calls: Arc::new(AtomicUsize::new(0)),
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn uncacheable(mut self) -> Self {
            self.descriptor.cacheable = false;
            self
        }
    }

    #[async_trait]
    impl Adapter for StubAdapter {
        fn descriptor(&self) -> &AdapterDescriptor {
            &self.descriptor
        }

        async fn search(&self, query: &Query, _provider: &ProviderChoice) -> AnswerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let outcome = match &self.behavior {
                Behavior::Answer(keys) => {
                    AnswerOutcome::choice(self.name(), query.qtype, keys.clone())
                }
                Behavior::Fail(kind) => {
                    AnswerOutcome::failure(self.name(), query.qtype, *kind, "scripted failure")
                }
                Behavior::Panic => panic!("scripted panic"),
                Behavior::Slow(delay, keys) => {
                    tokio::time::sleep(*delay).await;
                    AnswerOutcome::choice(self.name(), query.qtype, keys.clone())
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    /// Cache stub that scripts hits and records writes.
    struct RecordingCache {
        hits: HashMap<String, AnswerOutcome>,
        stored: parking_lot::Mutex<Vec<(String, AnswerOutcome)>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingCache {
        fn empty() -> Self {
            Self {
                hits: HashMap::new(),
                stored: parking_lot::Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            }
        }

        fn with_hit(name: &str, answer: AnswerOutcome) -> Self {
            let mut cache = Self::empty();
            cache.hits.insert(name.to_string(), answer);
            cache
        }
    }

    #[async_trait]
    impl AnswerCache for RecordingCache {
        async fn cached_answers(
            &self,
            _query: &Query,
            providers: &[String],
        ) -> HashMap<String, Option<AnswerOutcome>> {
            providers
                .iter()
                .map(|name| (name.clone(), self.hits.get(name).cloned()))
                .collect()
        }

        async fn any_cached_answer(&self, _query: &Query) -> Option<AnswerOutcome> {
            self.hits.values().next().cloned()
        }

        async fn store_answers(
            &self,
            _query: &Query,
            entries: &[(String, AnswerOutcome)],
        ) -> anyhow::Result<()> {
            self.stored.lock().extend(entries.iter().cloned());
            self.notify.notify_one();
            Ok(())
        }
    }

    fn query() -> Query {
        Query::new("测试题目", QuestionType::Single)
            .with_options(vec!["甲".into(), "乙".into(), "丙".into(), "丁".into()])
    }

    fn engine_with(
        adapters: Vec<Arc<dyn Adapter>>,
        cache: Arc<dyn AnswerCache>,
    ) -> SearchEngine {
        let registry = Registry::from_adapters(adapters).expect("registry builds");
        SearchEngine::new(Arc::new(registry), cache)
    }

    fn choices(names: &[&str]) -> Vec<ProviderChoice> {
        names.iter().map(|n| ProviderChoice::new(*n)).collect()
    }

    #[tokio::test]
    async fn empty_provider_list_fails_the_request() {
        let engine = engine_with(
            vec![Arc::new(StubAdapter::new("a", Behavior::Answer(vec!["A".into()])))],
            Arc::new(NullCache),
        );
        let err = engine.search(&query(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoProviders));
    }

    #[tokio::test]
    async fn one_failing_adapter_does_not_disturb_the_others() {
        let engine = engine_with(
            vec![
                Arc::new(StubAdapter::new("down", Behavior::Fail(ErrorKind::NetworkError))),
                Arc::new(StubAdapter::new("up", Behavior::Answer(vec!["B".into()]))),
            ],
            Arc::new(NullCache),
        );

        let result = engine.search(&query(), choices(&["down", "up"])).await.unwrap();
        assert_eq!(result.total_providers, 2);
        assert_eq!(result.successful_providers, 1);
        assert_eq!(result.failed_providers, 1);
        assert_eq!(result.unified_answer.answer_key, vec!["B".to_string()]);
        assert!(result.provider_answers.iter().any(|a| a.provider == "down"));
    }

    #[tokio::test]
    async fn panicking_adapter_becomes_an_unknown_failure() {
        let engine = engine_with(
            vec![
                Arc::new(StubAdapter::new("boom", Behavior::Panic)),
                Arc::new(StubAdapter::new("up", Behavior::Answer(vec!["A".into()]))),
            ],
            Arc::new(NullCache),
        );

        let result = engine.search(&query(), choices(&["boom", "up"])).await.unwrap();
        assert_eq!(result.total_providers, 2);
        let boom = result
            .provider_answers
            .iter()
            .find(|a| a.provider == "boom")
            .expect("panicked adapter still listed");
        assert!(!boom.success);
        assert_eq!(boom.error_kind, Some(ErrorKind::Unknown));
        assert_eq!(result.unified_answer.answer_key, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn fan_out_respects_the_concurrency_bound() {
        // All stubs share one in-flight counter so the high-water mark
        // covers the whole request.
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
        let mut names = Vec::new();
        for i in 0..12 {
            let name = format!("slow{i}");
            let mut stub = StubAdapter::new(
                &name,
                Behavior::Slow(Duration::from_millis(30), vec!["A".into()]),
            );
            stub.in_flight = Arc::clone(&in_flight);
            stub.max_in_flight = Arc::clone(&max_in_flight);
            adapters.push(Arc::new(stub));
            names.push(name);
        }

        let engine = engine_with(adapters, Arc::new(NullCache)).with_max_concurrency(4);
        let provider_names: Vec<&str> = names.iter().map(String::as_str).collect();
        let result = engine.search(&query(), choices(&provider_names)).await.unwrap();

        assert_eq!(result.total_providers, 12);
        assert!(
            max_in_flight.load(Ordering::SeqCst) <= 4,
            "observed {} concurrent calls",
            max_in_flight.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn cache_hits_skip_adapter_dispatch() {
        let hit = AnswerOutcome::choice("cached-bank", QuestionType::Single, vec!["A".into()]);
        let stub = Arc::new(StubAdapter::new("cached-bank", Behavior::Answer(vec!["B".into()])));
        let calls = Arc::clone(&stub.calls);

        let engine = engine_with(
            vec![stub],
            Arc::new(RecordingCache::with_hit("cached-bank", hit)),
        );

        let result = engine.search(&query(), choices(&["cached-bank"])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0, "adapter must not be called");
        assert_eq!(result.successful_providers, 1);
        assert_eq!(result.unified_answer.answer_key, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn successful_cacheable_results_are_written_through() {
        let cache = Arc::new(RecordingCache::empty());
        let engine = engine_with(
            vec![
                Arc::new(StubAdapter::new("bank", Behavior::Answer(vec!["A".into()]))),
                Arc::new(StubAdapter::new("failing", Behavior::Fail(ErrorKind::ApiError))),
                Arc::new(StubAdapter::new("local", Behavior::Answer(vec!["B".into()])).uncacheable()),
            ],
            Arc::clone(&cache) as Arc<dyn AnswerCache>,
        );

        engine
            .search(&query(), choices(&["bank", "failing", "local"]))
            .await
            .unwrap();

        // The write-through task is detached; wait for its signal.
        tokio::time::timeout(Duration::from_secs(1), cache.notify.notified())
            .await
            .expect("write-through runs");
        let stored = cache.stored.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "bank");
    }

    #[tokio::test]
    async fn unknown_providers_are_skipped_with_the_rest_unaffected() {
        let engine = engine_with(
            vec![Arc::new(StubAdapter::new("known", Behavior::Answer(vec!["C".into()])))],
            Arc::new(NullCache),
        );

        let result = engine
            .search(&query(), choices(&["missing", "known"]))
            .await
            .unwrap();
        assert_eq!(result.total_providers, 1);
        assert_eq!(result.provider_answers[0].provider, "known");
    }
}
