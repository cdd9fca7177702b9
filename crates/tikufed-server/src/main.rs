use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tikufed_cache::{CacheStore, DbSettings, EmbeddingClient, EmbeddingSettings, MIGRATOR};
use tikufed_router::{default_client, AnswerCache, Registry, SearchEngine};

use tikufed_server::config::{Settings, TokenStore};
use tikufed_server::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TIKUFED_CONFIG").ok())
        .unwrap_or_else(|| "tikufed.toml".to_string());
    let settings = Settings::load(&PathBuf::from(&settings_path))?;

    // The cache is this service's reason to exist; a dead database is
    // fatal at startup (later outages degrade per-request instead).
    let mut db = match &settings.database.url {
        Some(url) => DbSettings::new(url.clone()),
        None => DbSettings::from_env(),
    };
    if let Some(max) = settings.database.max_connections {
        db.max_connections = max;
    }
    let pool = db
        .connect()
        .await
        .context("connecting to the cache database")?;
    MIGRATOR
        .run(&pool)
        .await
        .context("running cache migrations")?;
    tracing::info!("cache database ready");

    let client = default_client().context("building the shared HTTP client")?;

    let mut store = CacheStore::new(pool);
    match &settings.embedding {
        Some(section) => {
            let embedder = EmbeddingClient::new(
                client.clone(),
                EmbeddingSettings {
                    base_url: section.base_url.clone(),
                    api_key: section.api_key.clone(),
                    model: section.model.clone(),
                    dimension: section.dimension,
                },
            );
            tracing::info!(model = %section.model, dimension = section.dimension, "semantic lookup enabled");
            store = store.with_embedder(embedder);
        }
        None => {
            tracing::info!("no embedding service configured, cache runs exact-match only");
        }
    }
    let cache: Arc<dyn AnswerCache> = Arc::new(store);

    let registry = Arc::new(
        Registry::bootstrap(client, Arc::clone(&cache)).context("building the adapter registry")?,
    );
    let engine = Arc::new(
        SearchEngine::new(registry, cache)
            .with_max_concurrency(settings.server.max_concurrency),
    );
    let tokens = Arc::new(TokenStore::from_settings(&settings.tokens));

    let app = router(AppState { engine, tokens });
    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;
    tracing::info!(bind = %settings.server.bind, "tikufed listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
