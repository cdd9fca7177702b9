mod config;
mod embedding;
mod error;
mod models;
mod store;

pub use config::DbSettings;
pub use embedding::{EmbedError, EmbeddingClient, EmbeddingSettings};
pub use error::StoreError;
pub use models::{AnswerPayloadRow, CachedAnswerRow, QuestionRow};
pub use store::{CacheStore, NEAREST_NEIGHBORS, SIMILARITY_THRESHOLD};

/// Embedded schema migrations, run once at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
