//! Local cache adapter: answers from the persistent store without any
//! network round-trip. Clients include it to ask "only use the cache".

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::cache::AnswerCache;
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query};

pub struct LocalCache {
    descriptor: AdapterDescriptor,
    cache: Arc<dyn AnswerCache>,
}

impl LocalCache {
    pub fn new(cache: Arc<dyn AnswerCache>) -> Self {
        Self {
            // Not cacheable: writing cache reads back into the cache would
            // launder every answer as Local's.
            descriptor: AdapterDescriptor::new("Local", "本地缓存")
                .free(true)
                .pay(false)
                .cacheable(false),
            cache,
        }
    }
}

#[async_trait]
impl Adapter for LocalCache {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, _provider: &ProviderChoice) -> AnswerOutcome {
        match self.cache.any_cached_answer(query).await {
            Some(mut answer) => {
                answer.provider = self.name().to_string();
                answer
            }
            None => AnswerOutcome::failure(
                self.name(),
                query.qtype,
                ErrorKind::CacheMiss,
                "缓存中未找到该题目",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;
    use crate::types::QuestionType;
    use std::collections::HashMap;

    struct OneAnswerCache(AnswerOutcome);

    #[async_trait]
    impl AnswerCache for OneAnswerCache {
        async fn cached_answers(
            &self,
            _query: &Query,
            providers: &[String],
        ) -> HashMap<String, Option<AnswerOutcome>> {
            providers.iter().map(|n| (n.clone(), None)).collect()
        }

        async fn any_cached_answer(&self, _query: &Query) -> Option<AnswerOutcome> {
            Some(self.0.clone())
        }

        async fn store_answers(
            &self,
            _query: &Query,
            _entries: &[(String, AnswerOutcome)],
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn query() -> Query {
        Query::new("测试题目", QuestionType::Single)
    }

    #[tokio::test]
    async fn hit_is_relabeled_as_local() {
        let cached = AnswerOutcome::choice("言溪题库", QuestionType::Single, vec!["A".into()]);
        let adapter = LocalCache::new(Arc::new(OneAnswerCache(cached)));
        let outcome = adapter.search(&query(), &ProviderChoice::new("Local")).await;
        assert!(outcome.success);
        assert_eq!(outcome.provider, "Local");
        assert_eq!(outcome.choice.as_deref(), Some(&["A".to_string()][..]));
    }

    #[tokio::test]
    async fn miss_is_a_cache_miss_failure() {
        let adapter = LocalCache::new(Arc::new(NullCache));
        let outcome = adapter.search(&query(), &ProviderChoice::new("Local")).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::CacheMiss));
    }
}
