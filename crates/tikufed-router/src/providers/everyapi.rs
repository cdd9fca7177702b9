//! everyAPI题库 adapter: GET endpoint with the question in the URL path,
//! answers as option/content pairs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_keys;
use crate::providers::text::{extract_choice_keys, parse_judgement};
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "https://www.everyapi.com/api/v1/q";

#[derive(Debug, Deserialize)]
struct EveryApiConfig {
    token: String,
}

pub struct EveryApi {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl EveryApi {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("everyAPI题库", "https://www.everyapi.com/")
                .free(true)
                .pay(true)
                .schema(ConfigSchema::new(vec![ConfigField::required(
                    "token",
                    FieldKind::String,
                    "授权token",
                )])),
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("code").and_then(Value::as_i64) != Some(0) {
            let message = data
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("未找到答案");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let Some(result) = data.get("data").filter(|d| !d.is_null()) else {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "API返回数据为空");
        };
        let correct: Vec<&Value> = result
            .get("correct")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default();
        if correct.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }
        let api_type = result.get("type").and_then(Value::as_i64);

        self.parse_answer(&correct, api_type, query)
    }

    /// Upstream types: 0=single, 1=multiple, 2=text, 3=judgement.
    fn parse_answer(&self, correct: &[&Value], api_type: Option<i64>, query: &Query) -> AnswerOutcome {
        let name = self.name();
        let contents: Vec<String> = correct
            .iter()
            .filter_map(|item| item.get("content").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        match api_type {
            Some(0) | Some(1) => {
                let mut keys: Vec<String> = correct
                    .iter()
                    .filter_map(|item| item.get("option").and_then(Value::as_str))
                    .map(|k| k.trim().to_ascii_uppercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keys.is_empty() {
                    for content in &contents {
                        keys.extend(extract_choice_keys(content));
                    }
                }
                let fallback = (!contents.is_empty()).then(|| contents.join(" "));
                build_choice_answer_from_keys(
                    name,
                    &keys,
                    fallback.as_deref(),
                    query.options(),
                    query.qtype,
                )
            }
            Some(2) => {
                if contents.is_empty() {
                    return AnswerOutcome::failure(
                        name,
                        query.qtype,
                        ErrorKind::ApiError,
                        "未找到文本答案",
                    );
                }
                let qtype = if query.qtype.is_text() {
                    query.qtype
                } else {
                    QuestionType::FillBlank
                };
                AnswerOutcome::text(name, qtype, contents)
            }
            Some(3) => {
                let marker = correct
                    .first()
                    .and_then(|item| {
                        item.get("content")
                            .or_else(|| item.get("option"))
                            .and_then(Value::as_str)
                    })
                    .unwrap_or("");
                AnswerOutcome::judgement(name, parse_judgement(marker))
            }
            _ => {
                // Unknown upstream type still answers: the contents as
                // text, or a placeholder when even those are missing.
                let texts = if contents.is_empty() {
                    vec!["未知答案".to_string()]
                } else {
                    contents
                };
                AnswerOutcome::text(name, query.qtype, texts)
            }
        }
    }
}

#[async_trait]
impl Adapter for EveryApi {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: EveryApiConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let url = format!("{}/{}", self.url, urlencoding::encode(&query.content));
        let response = match self
            .client
            .get(&url)
            .query(&[("simple", "false"), ("token", config.token.as_str())])
            .bearer_auth(&config.token)
            .timeout(BANK_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return AnswerOutcome::failure(
                    name,
                    query.qtype,
                    ErrorKind::NetworkError,
                    format!("网络请求失败: {error}"),
                )
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("msg").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "请求参数错误".to_string());
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }
        if !status.is_success() {
            return AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ApiError,
                format!("HTTP {status}"),
            );
        }

        match response.json::<Value>().await {
            Ok(data) => self.parse_response(&data, query),
            Err(error) => AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ParseError,
                format!("响应解析失败: {error}"),
            ),
        }
    }
}
