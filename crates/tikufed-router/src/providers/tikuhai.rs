//! 题库海 adapter: POST endpoint with version headers. The upstream drops
//! requests under load, so this adapter retries a bounded number of times
//! before giving up.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_texts;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::retry::RetryPolicy;
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "https://api.tikuhai.com/search";

#[derive(Debug, Deserialize)]
struct TikuhaiConfig {
    key: String,
}

pub struct Tikuhai {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl Tikuhai {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("题库海", "https://www.tikuhai.com/")
                .free(false)
                .pay(true)
                .schema(ConfigSchema::new(vec![ConfigField::required(
                    "key",
                    FieldKind::String,
                    "API密钥",
                )])),
            client,
            url: DEFAULT_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, body: &Value) -> Result<Value, AnswerFailure> {
        let mut strategy = self.retry.strategy();
        loop {
            let attempt = self
                .client
                .post(&self.url)
                .header("v", "1.0.0")
                .json(body)
                .timeout(BANK_TIMEOUT)
                .send()
                .await;

            match attempt {
                Ok(response) if response.status().is_success() => {
                    return response.json::<Value>().await.map_err(|error| AnswerFailure {
                        kind: ErrorKind::ParseError,
                        message: format!("响应解析失败: {error}"),
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    if let Some(delay) = strategy.next_delay() {
                        tracing::debug!(%status, attempt = strategy.attempts(), "题库海 retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AnswerFailure {
                        kind: ErrorKind::ApiError,
                        message: format!("HTTP {status}"),
                    });
                }
                Err(error) => {
                    if let Some(delay) = strategy.next_delay() {
                        tracing::debug!(%error, attempt = strategy.attempts(), "题库海 retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AnswerFailure {
                        kind: ErrorKind::NetworkError,
                        message: format!("网络请求失败: {error}"),
                    });
                }
            }
        }
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("code").and_then(Value::as_i64) != Some(200) {
            let message = data.get("msg").and_then(Value::as_str).unwrap_or("未找到答案");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let answers: Vec<String> = data
            .pointer("/data/answer")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if answers.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => {
                build_choice_answer_from_texts(name, &answers, query.options(), query.qtype)
            }
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, answers)
            }
            QuestionType::Judgement => {
                AnswerOutcome::judgement(name, parse_judgement(&answers[0]))
            }
        }
    }
}

struct AnswerFailure {
    kind: ErrorKind,
    message: String,
}

#[async_trait]
impl Adapter for Tikuhai {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: TikuhaiConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let body = json!({
            "question": query.content,
            "options": query.options,
            "type": query.qtype,
            "key": config.key,
            "questionData": "",
        });

        match self.request(&body).await {
            Ok(data) => self.parse_response(&data, query),
            Err(failure) => {
                AnswerOutcome::failure(name, query.qtype, failure.kind, failure.message)
            }
        }
    }
}
