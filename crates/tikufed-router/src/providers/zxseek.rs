//! 文科题库 (wkexam) adapter: a free upstream whose answers arrive as
//! option letters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_keys;
use crate::providers::text::parse_judgement;
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "http://api.wkexam.com/api";

/// The public endpoint accepts a shared community token.
const PUBLIC_TOKEN: &str = "qqqqq";

#[derive(Debug, Deserialize)]
struct ZxseekConfig {
    #[serde(default)]
    token: Option<String>,
}

pub struct Zxseek {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Zxseek {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("文科题库", "http://api.wkexam.com/")
                .free(true)
                .pay(false)
                .schema(ConfigSchema::new(vec![ConfigField::optional(
                    "token",
                    FieldKind::String,
                    "授权token",
                )
                .default_value(json!(PUBLIC_TOKEN))])),
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
        if data.get("code").and_then(Value::as_i64) != Some(1) {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
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
            QuestionType::Single | QuestionType::Multiple => build_choice_answer_from_keys(
                name,
                &answers,
                Some(&answers.join(" ")),
                query.options(),
                query.qtype,
            ),
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, answers)
            }
            QuestionType::Judgement => {
                AnswerOutcome::judgement(name, parse_judgement(&answers[0]))
            }
        }
    }
}

#[async_trait]
impl Adapter for Zxseek {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: ZxseekConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };
        let token = config.token.unwrap_or_else(|| PUBLIC_TOKEN.to_string());

        let response = match self
            .client
            .get(&self.url)
            .query(&[("token", token.as_str()), ("q", query.content.as_str())])
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

        if !response.status().is_success() {
            return AnswerOutcome::failure(
                name,
                query.qtype,
                ErrorKind::ApiError,
                format!("HTTP {}", response.status()),
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
