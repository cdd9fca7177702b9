use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::adapter::Adapter;
use crate::cache::AnswerCache;
use crate::error::{Error, Result};
use crate::providers::{
    Axe, Enncy, EveryApi, Icodef, Lemon, Like, LocalCache, SiliconFlow, Tikuhai, Wanneng, Zxseek,
};

/// Process-wide mapping from provider name to its singleton adapter.
///
/// Populated once at startup from a declarative constructor list, then
/// read-only for the process lifetime. Duplicate names are a fatal
/// startup error.
pub struct Registry {
    adapters: Vec<Arc<dyn Adapter>>,
    by_name: HashMap<String, usize>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("by_name", &self.by_name)
            .finish()
    }
}

impl Registry {
    /// Build the full base adapter set over the shared HTTP client and the
    /// answer cache (consumed by the local-cache adapter).
    pub fn bootstrap(client: Client, cache: Arc<dyn AnswerCache>) -> Result<Self> {
        let adapters: Vec<Arc<dyn Adapter>> = vec![
            Arc::new(Enncy::new(client.clone())),
            Arc::new(Wanneng::new(client.clone())),
            Arc::new(EveryApi::new(client.clone())),
            Arc::new(Like::new(client.clone())),
            Arc::new(Tikuhai::new(client.clone())),
            Arc::new(Lemon::new(client.clone())),
            Arc::new(Icodef::new(client.clone())),
            Arc::new(Axe::new(client.clone())),
            Arc::new(Zxseek::new(client.clone())),
            Arc::new(SiliconFlow::new(client)),
            Arc::new(LocalCache::new(cache)),
        ];
        Self::from_adapters(adapters)
    }

    /// Build a registry from an explicit adapter list (tests, embedders).
    pub fn from_adapters(adapters: Vec<Arc<dyn Adapter>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(adapters.len());
        for (index, adapter) in adapters.iter().enumerate() {
            let name = adapter.name().to_string();
            if by_name.insert(name.clone(), index).is_some() {
                return Err(Error::DuplicateAdapter(name));
            }
        }
        tracing::info!(
            adapters = adapters.len(),
            names = ?adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "adapter registry initialized"
        );
        Ok(Self { adapters, by_name })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.by_name
            .get(name)
            .map(|index| Arc::clone(&self.adapters[*index]))
    }

    /// Adapters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullCache;

    #[test]
    fn bootstrap_registers_the_full_base_set() {
        let registry =
            Registry::bootstrap(Client::new(), Arc::new(NullCache)).expect("registry builds");
        assert_eq!(registry.len(), 11);
        assert!(registry.get("言溪题库").is_some());
        assert!(registry.get("Local").is_some());
        assert!(registry.get("不存在的适配器").is_none());
    }

    #[test]
    fn duplicate_names_fail_startup() {
        let client = Client::new();
        let adapters: Vec<Arc<dyn Adapter>> = vec![
            Arc::new(Enncy::new(client.clone())),
            Arc::new(Enncy::new(client)),
        ];
        let err = Registry::from_adapters(adapters).unwrap_err();
        assert!(matches!(err, Error::DuplicateAdapter(name) if name == "言溪题库"));
    }

    #[test]
    fn only_the_local_adapter_is_uncacheable() {
        let registry =
            Registry::bootstrap(Client::new(), Arc::new(NullCache)).expect("registry builds");
        let uncacheable: Vec<&str> = registry
            .iter()
            .filter(|a| !a.descriptor().cacheable)
            .map(|a| a.name())
            .collect();
        assert_eq!(uncacheable, vec!["Local"]);
    }
}
