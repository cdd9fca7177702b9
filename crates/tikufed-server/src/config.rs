//! Service settings: TOML file with environment overrides, including the
//! per-token stored provider configurations the search endpoint resolves
//! against.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};

use tikufed_router::ProviderChoice;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub embedding: Option<EmbeddingSection>,
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8060".to_string()
}

fn default_max_concurrency() -> usize {
    20
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    /// Overrides the `DATABASE_URL` / `DB_*` environment variables.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingSection {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

fn default_embedding_model() -> String {
    "BAAI/bge-m3".to_string()
}

fn default_embedding_dimension() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSettings {
    pub token: String,
    #[serde(default)]
    pub providers: Vec<StoredProvider>,
}

/// One provider configuration stored for a token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredProvider {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl Settings {
    /// Load from a TOML file; a missing file yields the defaults so the
    /// service can start against env-configured infrastructure alone.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(settings)
    }
}

/// Per-token stored provider configurations.
///
/// With no tokens configured the service runs open: any bearer token is
/// accepted and requests must name their providers explicitly.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: HashMap<String, Vec<StoredProvider>>,
}

impl TokenStore {
    pub fn from_settings(tokens: &[TokenSettings]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| (t.token.clone(), t.providers.clone()))
                .collect(),
        }
    }

    /// The stored providers for a presented token, or `None` when the
    /// token is rejected.
    pub fn authorize(&self, token: &str) -> Option<Vec<StoredProvider>> {
        if self.tokens.is_empty() {
            return Some(Vec::new());
        }
        self.tokens.get(token).cloned()
    }
}

/// Merge the request's provider list onto the token's stored
/// configurations.
///
/// Request-named providers win; their config is laid over the stored
/// config key by key (request wins on conflict). Without a request list,
/// every enabled stored provider is used as-is.
pub fn resolve_providers(
    requested: Option<Vec<ProviderChoice>>,
    stored: &[StoredProvider],
) -> Vec<ProviderChoice> {
    let enabled: HashMap<&str, &StoredProvider> = stored
        .iter()
        .filter(|p| p.enabled)
        .map(|p| (p.name.as_str(), p))
        .collect();

    let requested = match requested {
        Some(list) if !list.is_empty() => list,
        _ => {
            return stored
                .iter()
                .filter(|p| p.enabled)
                .map(|p| {
                    ProviderChoice::new(p.name.clone()).with_config(p.config.clone())
                })
                .collect();
        }
    };

    requested
        .into_iter()
        .map(|mut provider| {
            let mut merged = enabled
                .get(provider.name.as_str())
                .map(|p| p.config.clone())
                .unwrap_or_default();
            if let Some(overrides) = provider.config.take() {
                for (key, value) in overrides {
                    merged.insert(key, value);
                }
            }
            provider.config = Some(merged);
            provider
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored(name: &str, enabled: bool, config: Value) -> StoredProvider {
        StoredProvider {
            name: name.to_string(),
            enabled,
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn no_request_list_uses_enabled_stored_providers() {
        let stored = vec![
            stored("言溪题库", true, json!({"token": "a"})),
            stored("万能题库", false, json!({"token": "b"})),
        ];
        let resolved = resolve_providers(None, &stored);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "言溪题库");
    }

    #[test]
    fn request_config_overrides_stored_config_per_key() {
        let stored_list = vec![stored(
            "Like知识库",
            true,
            json!({"key": "stored-key", "model": "m1"}),
        )];
        let requested = vec![ProviderChoice::new("Like知识库")
            .with_config(json!({"model": "m2"}).as_object().cloned().unwrap())];

        let resolved = resolve_providers(Some(requested), &stored_list);
        let config = resolved[0].config.as_ref().unwrap();
        assert_eq!(config["key"], "stored-key");
        assert_eq!(config["model"], "m2");
    }

    #[test]
    fn request_provider_without_stored_config_keeps_its_own() {
        let resolved = resolve_providers(
            Some(vec![ProviderChoice::new("文科题库")]),
            &[],
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].config.as_ref().map(|c| c.len()), Some(0));
    }

    #[test]
    fn disabled_stored_provider_contributes_no_config() {
        let stored_list = vec![stored("言溪题库", false, json!({"token": "a"}))];
        let requested = vec![ProviderChoice::new("言溪题库")];
        let resolved = resolve_providers(Some(requested), &stored_list);
        assert_eq!(resolved[0].config.as_ref().map(|c| c.len()), Some(0));
    }

    #[test]
    fn empty_token_store_accepts_any_token() {
        let store = TokenStore::default();
        assert_eq!(store.authorize("anything"), Some(Vec::new()));
    }

    #[test]
    fn configured_token_store_rejects_unknown_tokens() {
        let store = TokenStore::from_settings(&[TokenSettings {
            token: "dev".to_string(),
            providers: Vec::new(),
        }]);
        assert!(store.authorize("dev").is_some());
        assert!(store.authorize("other").is_none());
    }

    #[test]
    fn settings_parse_from_toml() {
        let raw = r#"
            [server]
            bind = "0.0.0.0:9000"

            [database]
            url = "postgres://u:p@db:5432/tikufed"

            [embedding]
            base_url = "http://embed:9100/v1"

            [[tokens]]
            token = "dev"

            [[tokens.providers]]
            name = "言溪题库"
            config = { token = "abc" }
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.server.bind, "0.0.0.0:9000");
        assert_eq!(settings.server.max_concurrency, 20);
        assert_eq!(settings.embedding.unwrap().dimension, 1024);
        assert_eq!(settings.tokens[0].providers[0].name, "言溪题库");
        assert!(settings.tokens[0].providers[0].enabled);
    }
}
