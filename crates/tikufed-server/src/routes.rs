//! HTTP surface: the search endpoint, the provider listing, and liveness.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use tikufed_router::{Error as EngineError, ProviderChoice, Query, SearchEngine};

use crate::config::{resolve_providers, TokenStore};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub tokens: Arc<TokenStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/adapter-service/search", post(search))
        .route("/v1/adapter-service/providers", get(providers))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: Query,
    #[serde(default)]
    pub providers: Option<Vec<ProviderChoice>>,
}

enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, detail.to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("Missing authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized("Invalid authorization header"))
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers)?;
    let stored = state
        .tokens
        .authorize(token)
        .ok_or(ApiError::Unauthorized("Unknown API token"))?;

    if request.query.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Empty question content".to_string()));
    }

    let providers = resolve_providers(request.providers, &stored);
    let result = state
        .engine
        .search(&request.query, providers)
        .await
        .map_err(|error| match error {
            EngineError::NoProviders => {
                ApiError::BadRequest("No providers specified".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(result).into_response())
}

/// Descriptor + config schema listing, enough to generate config editors.
async fn providers(State(state): State<AppState>) -> Response {
    let listing: Vec<_> = state
        .engine
        .registry()
        .iter()
        .map(|adapter| adapter.descriptor().clone())
        .collect();
    Json(listing).into_response()
}

async fn healthz() -> &'static str {
    "ok"
}
