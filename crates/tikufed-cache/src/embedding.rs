//! Client for the black-box embedding service: text in, unit-norm vector
//! of a fixed dimension out, over an OpenAI-compatible `/embeddings`
//! endpoint.
//!
//! Retrieval-tuned models distinguish the query side from the stored side,
//! so `embed_query` prepends the retrieval instruction while
//! `embed_passage` sends the raw text.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const QUERY_INSTRUCTION: &str =
    "Represent this question for retrieving the same or highly similar exam questions:";

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("embedding response malformed: {0}")]
    BadResponse(String),
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            api_key: None,
            model: "BAAI/bge-m3".to_string(),
            dimension: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    settings: EmbeddingSettings,
}

impl EmbeddingClient {
    pub fn new(client: Client, settings: EmbeddingSettings) -> Self {
        Self { client, settings }
    }

    pub fn dimension(&self) -> usize {
        self.settings.dimension
    }

    /// Embed the retrieval side of a lookup.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.request(format!("{QUERY_INSTRUCTION}{text}")).await
    }

    /// Embed the stored side of a write-through.
    pub async fn embed_passage(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.request(text.to_string()).await
    }

    async fn request(&self, input: String) -> Result<Vec<f32>, EmbedError> {
        let body = EmbeddingRequest {
            model: &self.settings.model,
            input: vec![input],
        };

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.settings.base_url))
            .json(&body)
            .timeout(EMBED_TIMEOUT);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::BadResponse(e.to_string()))?;
        parsed.data.sort_by_key(|d| d.index);
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::BadResponse("empty data array".to_string()))?;

        if vector.len() != self.settings.dimension {
            return Err(EmbedError::BadResponse(format!(
                "expected dimension {}, got {}",
                self.settings.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: i64,
    embedding: Vec<f32>,
}
