use async_trait::async_trait;
use serde::Serialize;

use crate::schema::ConfigSchema;
use crate::types::{AnswerOutcome, ProviderChoice, Query};

/// Static description of one adapter: identity, tier flags, cache
/// eligibility, and the configuration schema for its `search` calls.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterDescriptor {
    /// Unique identifier, used in requests and in cache rows.
    pub name: String,
    /// Upstream home page (or a human label for non-HTTP adapters).
    pub home: String,
    /// Whether the upstream has a free tier.
    pub free: bool,
    /// Whether the upstream has a paid tier.
    pub pay: bool,
    /// Whether successful results are eligible for cache write-through.
    pub cacheable: bool,
    pub config_schema: ConfigSchema,
}

impl AdapterDescriptor {
    pub fn new(name: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            free: false,
            pay: true,
            cacheable: true,
            config_schema: ConfigSchema::empty(),
        }
    }

    pub fn free(mut self, free: bool) -> Self {
        self.free = free;
        self
    }

    pub fn pay(mut self, pay: bool) -> Self {
        self.pay = pay;
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn schema(mut self, schema: ConfigSchema) -> Self {
        self.config_schema = schema;
        self
    }
}

/// Uniform contract over a heterogeneous upstream.
///
/// Implementations are `Send + Sync` and stored as `Arc<dyn Adapter>` in
/// the registry, one singleton per upstream for the process lifetime.
///
/// `search` must never fail by signature: every upstream problem maps to a
/// failure [`AnswerOutcome`] with one of the closed error kinds. The
/// fan-out engine additionally guards against panics.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn descriptor(&self) -> &AdapterDescriptor;

    /// Query the upstream for one question and normalize the response.
    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}
