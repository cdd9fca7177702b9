//! 言溪题库 adapter: free/paid question bank with a single GET endpoint
//! that returns one answer string regardless of question type.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::adapter::{Adapter, AdapterDescriptor};
use crate::matcher::build_choice_answer_from_keys;
use crate::providers::text::{extract_choice_keys, parse_judgement, split_text_answer};
use crate::providers::{parse_config, BANK_TIMEOUT};
use crate::schema::{ConfigField, ConfigSchema, FieldKind};
use crate::types::{AnswerOutcome, ErrorKind, ProviderChoice, Query, QuestionType};

const DEFAULT_URL: &str = "https://tk.enncy.cn/query";

#[derive(Debug, Deserialize)]
struct EnncyConfig {
    token: String,
}

pub struct Enncy {
    descriptor: AdapterDescriptor,
    client: Client,
    url: String,
}

impl Enncy {
    pub fn new(client: Client) -> Self {
        Self {
            descriptor: AdapterDescriptor::new("言溪题库", "https://tk.enncy.cn/")
                .free(true)
                .pay(true)
                .schema(ConfigSchema::new(vec![ConfigField::required(
                    "token",
                    FieldKind::String,
                    "用户凭证",
                )
                .describe("在言溪题库个人中心获取的 token")])),
            client,
            url: DEFAULT_URL.to_string(),
        }
    }

    /// Override the upstream endpoint (tests, self-hosted mirrors).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn api_type(qtype: QuestionType) -> &'static str {
        match qtype {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
            QuestionType::FillBlank | QuestionType::Essay => "completion",
            QuestionType::Judgement => "judgement",
        }
    }

    fn parse_response(&self, data: &Value, query: &Query) -> AnswerOutcome {
        let name = self.name();
        if data.get("code").and_then(Value::as_i64) != Some(1) {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("未找到答案");
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, message);
        }

        let answer = data
            .pointer("/data/answer")
            .and_then(Value::as_str)
            .unwrap_or("");
        if answer.is_empty() {
            return AnswerOutcome::failure(name, query.qtype, ErrorKind::ApiError, "未找到答案");
        }

        match query.qtype {
            QuestionType::Single | QuestionType::Multiple => build_choice_answer_from_keys(
                name,
                &extract_choice_keys(answer),
                Some(answer),
                query.options(),
                query.qtype,
            ),
            QuestionType::FillBlank | QuestionType::Essay => {
                AnswerOutcome::text(name, query.qtype, split_text_answer(answer))
            }
            QuestionType::Judgement => AnswerOutcome::judgement(name, parse_judgement(answer)),
        }
    }
}

#[async_trait]
impl Adapter for Enncy {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &Query, provider: &ProviderChoice) -> AnswerOutcome {
        let name = self.name();
        let config: EnncyConfig = match parse_config(&self.descriptor, query, provider) {
            Ok(config) => config,
            Err(outcome) => return *outcome,
        };

        let mut params: Vec<(&str, String)> = vec![
            ("token", config.token),
            ("title", query.content.clone()),
            ("type", Self::api_type(query.qtype).to_string()),
        ];
        if let Some(options) = query.options() {
            params.push(("options", options.join("\n")));
        }

        let response = match self
            .client
            .get(&self.url)
            .query(&params)
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
