//! Endpoint behavior over an in-process router: auth, provider
//! resolution, and the cache-only flow. No outbound network traffic —
//! the only adapter exercised is the local cache over a null store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use tikufed_router::{NullCache, Registry, SearchEngine};
use tikufed_server::config::{TokenSettings, TokenStore};
use tikufed_server::routes::{router, AppState};

fn app(tokens: TokenStore) -> axum::Router {
    let cache = Arc::new(NullCache);
    let registry = Arc::new(
        Registry::bootstrap(reqwest::Client::new(), cache.clone()).expect("registry builds"),
    );
    let engine = Arc::new(SearchEngine::new(registry, cache));
    router(AppState {
        engine,
        tokens: Arc::new(tokens),
    })
}

fn open_app() -> axum::Router {
    app(TokenStore::default())
}

fn search_request(body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/adapter-service/search")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn query_body() -> Value {
    json!({
        "query": {"content": "测试题目", "type": 0, "options": ["甲", "乙"]},
        "providers": [{"name": "Local"}]
    })
}

#[tokio::test]
async fn missing_authorization_is_401() {
    let response = open_app()
        .oneshot(search_request(query_body(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_token_is_401_when_tokens_are_configured() {
    let tokens = TokenStore::from_settings(&[TokenSettings {
        token: "dev".to_string(),
        providers: Vec::new(),
    }]);
    let response = app(tokens)
        .oneshot(search_request(query_body(), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_resolved_provider_list_is_400() {
    let body = json!({
        "query": {"content": "测试题目", "type": 0},
        "providers": []
    });
    let response = open_app()
        .oneshot(search_request(body, Some("anything")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await;
    assert_eq!(detail["detail"], "No providers specified");
}

#[tokio::test]
async fn empty_question_content_is_400() {
    let body = json!({
        "query": {"content": "   ", "type": 0},
        "providers": [{"name": "Local"}]
    });
    let response = open_app()
        .oneshot(search_request(body, Some("anything")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_only_search_reports_a_cache_miss() {
    let response = open_app()
        .oneshot(search_request(query_body(), Some("anything")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    assert_eq!(result["total_providers"], 1);
    assert_eq!(result["successful_providers"], 0);
    assert_eq!(result["failed_providers"], 1);
    assert_eq!(result["provider_answers"][0]["provider"], "Local");
    assert_eq!(result["provider_answers"][0]["error_type"], "cache_miss");
    // An empty unified answer is still present.
    assert_eq!(result["unified_answer"]["answerKey"], json!([]));
    assert_eq!(result["unified_answer"]["answerText"], "");
}

#[tokio::test]
async fn unknown_providers_are_skipped_not_fatal() {
    let body = json!({
        "query": {"content": "测试题目", "type": 0},
        "providers": [{"name": "没有这个题库"}, {"name": "Local"}]
    });
    let response = open_app()
        .oneshot(search_request(body, Some("anything")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    assert_eq!(result["total_providers"], 1);
    assert_eq!(result["provider_answers"][0]["provider"], "Local");
}

#[tokio::test]
async fn provider_listing_exposes_descriptors_and_schemas() {
    let response = open_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/adapter-service/providers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listing = body_json(response).await;
    let list = listing.as_array().unwrap();
    assert_eq!(list.len(), 11);

    let enncy = list
        .iter()
        .find(|entry| entry["name"] == "言溪题库")
        .expect("enncy listed");
    assert_eq!(enncy["cacheable"], true);
    assert_eq!(enncy["config_schema"][0]["name"], "token");
    assert_eq!(enncy["config_schema"][0]["type"], "string");

    let local = list
        .iter()
        .find(|entry| entry["name"] == "Local")
        .expect("local listed");
    assert_eq!(local["cacheable"], false);
    assert_eq!(local["config_schema"], json!([]));
}

#[tokio::test]
async fn health_endpoint_answers() {
    let response = open_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
