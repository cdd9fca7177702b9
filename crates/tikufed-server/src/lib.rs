pub mod config;
pub mod routes;

pub use config::{resolve_providers, Settings, StoredProvider, TokenStore};
pub use routes::{router, AppState, SearchRequest};
